// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Remote status queries for each launch style.

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::services::context::ExecutionContext;
use crate::app::services::shell::sh_escape;
use crate::app::services::stager::script::EXIT_CODE_FILE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteState {
    Queued,
    Running,
    Done,
    Failed(String),
    /// The remote side does not (yet) know the identifier.
    NotFound,
}

impl RemoteState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RemoteState::Done | RemoteState::Failed(_))
    }
}

fn remote_error(command: &str, exit_code: i32, stderr: &str) -> AppError {
    AppError::with_message(
        AppErrorKind::Aborted,
        codes::REMOTE_ERROR,
        format!("status query failed with exit code {exit_code}"),
    )
    .with_context(format!("command={command} stderr={}", stderr.trim()))
}

/// `squeue` first; jobs that already left the queue are looked up in `sacct`.
pub async fn query_slurm(ctx: &ExecutionContext, job_id: &str) -> AppResult<RemoteState> {
    let command = format!("squeue -j {} -h -o %T", sh_escape(job_id));
    let capture = ctx.execute(&command).await?;
    if capture.exit_code == 0 {
        if let Some(state) = parse_squeue_state(&capture.stdout_lossy()) {
            return Ok(slurm_state(&state));
        }
    } else if !is_invalid_job_id(&capture.stderr_lossy()) {
        return Err(remote_error(&command, capture.exit_code, &capture.stderr_lossy()));
    }

    let command = format!("sacct -j {} -n -P -o State", sh_escape(job_id));
    let capture = ctx.execute(&command).await?;
    if capture.exit_code != 0 {
        return Err(remote_error(&command, capture.exit_code, &capture.stderr_lossy()));
    }
    let output = capture.stdout_lossy();
    if let Some(state) = sacct_terminal_state(&output) {
        return Ok(slurm_state(&state));
    }
    Ok(match parse_squeue_state(&output) {
        Some(state) => slurm_state(&state),
        None => RemoteState::NotFound,
    })
}

/// A live PID means running; otherwise the wrapper's exit-code file decides.
pub async fn query_pid(ctx: &ExecutionContext, pid: &str) -> AppResult<RemoteState> {
    let command = format!(
        "if ps -p {pid} > /dev/null 2>&1; then echo RUNNING; else cat {} 2>/dev/null || echo MISSING; fi",
        sh_escape(&ctx.exec_path(EXIT_CODE_FILE)),
        pid = sh_escape(pid),
    );
    let capture = ctx.execute(&command).await?;
    if capture.exit_code != 0 {
        return Err(remote_error(&command, capture.exit_code, &capture.stderr_lossy()));
    }
    Ok(parse_pid_status(&capture.stdout_lossy()))
}

pub async fn query_instance(ctx: &ExecutionContext, instance: &str) -> AppResult<RemoteState> {
    let command = "singularity instance list";
    let capture = ctx.execute(command).await?;
    if capture.exit_code != 0 {
        return Err(remote_error(command, capture.exit_code, &capture.stderr_lossy()));
    }
    let listed = capture
        .stdout_lossy()
        .split_whitespace()
        .any(|token| token == instance);
    Ok(if listed {
        RemoteState::Running
    } else {
        RemoteState::Done
    })
}

pub fn parse_pid_status(output: &str) -> RemoteState {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty());
    match line {
        Some("RUNNING") => RemoteState::Running,
        Some("MISSING") | None => RemoteState::NotFound,
        Some(code) => match code.parse::<i32>() {
            Ok(0) => RemoteState::Done,
            Ok(code) => RemoteState::Failed(format!("application exited with code {code}")),
            Err(_) => RemoteState::Failed(format!("unreadable exit code '{code}'")),
        },
    }
}

pub fn parse_squeue_state(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(normalize_slurm_state)
}

/// Terminal state across all steps; a single non-completed step wins.
pub fn sacct_terminal_state(output: &str) -> Option<String> {
    let states: Vec<String> = output
        .lines()
        .map(|line| line.split('|').next().unwrap_or("").trim())
        .filter(|state| !state.is_empty())
        .map(normalize_slurm_state)
        .collect();
    if states.is_empty() || states.iter().any(|s| !is_slurm_state_terminal(s)) {
        return None;
    }
    if states.iter().all(|s| s == "COMPLETED") {
        return Some("COMPLETED".to_string());
    }
    states.into_iter().find(|s| s != "COMPLETED")
}

pub fn slurm_state(state: &str) -> RemoteState {
    match state {
        "PENDING" | "CONFIGURING" | "REQUEUED" | "REQUEUE_HOLD" | "RESV_DEL_HOLD" => {
            RemoteState::Queued
        }
        "COMPLETED" => RemoteState::Done,
        s if is_slurm_state_terminal(s) => RemoteState::Failed(format!("scheduler reported {s}")),
        _ => RemoteState::Running,
    }
}

fn normalize_slurm_state(state: &str) -> String {
    let token = state
        .split(['+', ':', '(', ' '])
        .next()
        .unwrap_or(state)
        .trim();
    token.to_ascii_uppercase()
}

fn is_slurm_state_terminal(state: &str) -> bool {
    matches!(
        state,
        "COMPLETED"
            | "CANCELLED"
            | "FAILED"
            | "TIMEOUT"
            | "NODE_FAIL"
            | "PREEMPTED"
            | "BOOT_FAIL"
            | "OUT_OF_MEMORY"
            | "DEADLINE"
            | "SPECIAL_EXIT"
            | "REVOKED"
    )
}

fn is_invalid_job_id(text: &str) -> bool {
    text.to_ascii_lowercase().contains("invalid job id")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::app::testing::{ScriptedRemote, exit, ok, sample_job, sample_system};
    use crate::app::types::{JobStatus, JobType, Runtime};

    fn ctx(remote: Arc<ScriptedRemote>) -> ExecutionContext {
        let job = sample_job(JobType::Batch, Runtime::Docker, JobStatus::Queued);
        ExecutionContext::new(job, sample_system(), remote)
    }

    #[test]
    fn slurm_states_map_to_remote_states() {
        assert_eq!(slurm_state("PENDING"), RemoteState::Queued);
        assert_eq!(slurm_state("RUNNING"), RemoteState::Running);
        assert_eq!(slurm_state("COMPLETING"), RemoteState::Running);
        assert_eq!(slurm_state("COMPLETED"), RemoteState::Done);
        assert!(matches!(slurm_state("TIMEOUT"), RemoteState::Failed(_)));
    }

    #[test]
    fn sacct_prefers_failed_step() {
        assert_eq!(
            sacct_terminal_state("COMPLETED|\nFAILED|\n").as_deref(),
            Some("FAILED")
        );
        assert_eq!(
            sacct_terminal_state("CANCELLED by 1000|\n").as_deref(),
            Some("CANCELLED")
        );
        assert_eq!(sacct_terminal_state("RUNNING|\nCOMPLETED|\n"), None);
        assert_eq!(sacct_terminal_state(""), None);
    }

    #[test]
    fn pid_status_reads_exit_code() {
        assert_eq!(parse_pid_status("RUNNING\n"), RemoteState::Running);
        assert_eq!(parse_pid_status("0\n"), RemoteState::Done);
        assert!(matches!(parse_pid_status("137\n"), RemoteState::Failed(_)));
        assert_eq!(parse_pid_status("MISSING\n"), RemoteState::NotFound);
    }

    #[tokio::test]
    async fn slurm_query_falls_back_to_sacct() {
        let remote = Arc::new(ScriptedRemote::default());
        remote.on("squeue", ok(""));
        remote.on("sacct", ok("COMPLETED|\nCOMPLETED|\n"));
        let state = query_slurm(&ctx(remote.clone()), "482193").await.unwrap();
        assert_eq!(state, RemoteState::Done);
        assert_eq!(remote.commands().len(), 2);
    }

    #[tokio::test]
    async fn slurm_query_tolerates_invalid_job_id() {
        let remote = Arc::new(ScriptedRemote::default());
        remote.on("squeue", exit(1, "", "slurm_load_jobs error: Invalid job id specified"));
        remote.on("sacct", ok(""));
        let state = query_slurm(&ctx(remote), "1").await.unwrap();
        assert_eq!(state, RemoteState::NotFound);
    }

    #[tokio::test]
    async fn instance_query_looks_for_instance_name() {
        let remote = Arc::new(ScriptedRemote::default());
        remote.on(
            "instance list",
            ok("INSTANCE NAME    PID      IP    IMAGE\nabc    4242    /img.sif\n"),
        );
        let c = ctx(remote);
        assert_eq!(query_instance(&c, "abc").await.unwrap(), RemoteState::Running);
        assert_eq!(query_instance(&c, "zzz").await.unwrap(), RemoteState::Done);
    }
}
