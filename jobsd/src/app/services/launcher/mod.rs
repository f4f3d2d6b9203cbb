// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod extract;
pub mod throttle;

use async_trait::async_trait;

use crate::app::errors::{AppError, AppResult};
use crate::app::ports::{ExecCapture, JobStorePort};
use crate::app::services::context::ExecutionContext;
use crate::app::services::monitor::remote_status::{self, RemoteState};
use crate::app::services::shell::sh_escape;
use crate::app::services::stager::script::{OUTPUT_FILE, SCRIPT_FILE};
use crate::app::types::JobStatus;

pub use extract::launch_error;
pub use throttle::{LaunchThrottle, ThrottleSettings};

/// Submission, identification, status and cancellation for one launch style.
#[async_trait]
pub trait JobLauncher: Send + Sync {
    /// Whether a remote scheduler enforces the job's wall-clock limit.
    fn scheduled(&self) -> bool {
        false
    }

    /// Status the job enters once the remote id is known.
    fn launched_status(&self) -> JobStatus;

    fn launch_command(&self, ctx: &ExecutionContext) -> String;

    async fn remote_id(&self, ctx: &ExecutionContext, capture: &ExecCapture) -> AppResult<String>;

    async fn query_status(&self, ctx: &ExecutionContext, remote_id: &str) -> AppResult<RemoteState>;

    fn cancel_command(&self, ctx: &ExecutionContext, remote_id: &str) -> String;
}

fn cd_exec_dir(ctx: &ExecutionContext) -> String {
    format!("cd {}", sh_escape(&ctx.job().exec_dir))
}

/// Wrapper detached on the host; the identifier is the wrapper's PID.
pub struct PidLauncher;

#[async_trait]
impl JobLauncher for PidLauncher {
    fn launched_status(&self) -> JobStatus {
        JobStatus::Running
    }

    fn launch_command(&self, ctx: &ExecutionContext) -> String {
        format!(
            "{}; nohup setsid ./{SCRIPT_FILE} > {OUTPUT_FILE} 2>&1 < /dev/null & echo $!",
            cd_exec_dir(ctx)
        )
    }

    async fn remote_id(&self, _ctx: &ExecutionContext, capture: &ExecCapture) -> AppResult<String> {
        Ok(extract::extract_pid(&capture.stdout_lossy())?.to_string())
    }

    async fn query_status(
        &self,
        ctx: &ExecutionContext,
        remote_id: &str,
    ) -> AppResult<RemoteState> {
        remote_status::query_pid(ctx, remote_id).await
    }

    fn cancel_command(&self, _ctx: &ExecutionContext, remote_id: &str) -> String {
        let pid = sh_escape(remote_id);
        format!("kill -TERM -- -{pid} 2>/dev/null || kill -TERM {pid}")
    }
}

/// Slurm batch submission.
pub struct BatchLauncher;

#[async_trait]
impl JobLauncher for BatchLauncher {
    fn scheduled(&self) -> bool {
        true
    }

    fn launched_status(&self) -> JobStatus {
        JobStatus::Queued
    }

    fn launch_command(&self, ctx: &ExecutionContext) -> String {
        format!("{}; sbatch {SCRIPT_FILE}", cd_exec_dir(ctx))
    }

    async fn remote_id(&self, _ctx: &ExecutionContext, capture: &ExecCapture) -> AppResult<String> {
        extract::extract_batch_job_id(&capture.stdout_lossy())
    }

    async fn query_status(
        &self,
        ctx: &ExecutionContext,
        remote_id: &str,
    ) -> AppResult<RemoteState> {
        remote_status::query_slurm(ctx, remote_id).await
    }

    fn cancel_command(&self, _ctx: &ExecutionContext, remote_id: &str) -> String {
        format!("scancel {}", sh_escape(remote_id))
    }
}

/// Singularity instance named after the job; the id comes from the instance listing.
pub struct InstanceLauncher;

#[async_trait]
impl JobLauncher for InstanceLauncher {
    fn launched_status(&self) -> JobStatus {
        JobStatus::Running
    }

    fn launch_command(&self, ctx: &ExecutionContext) -> String {
        format!(
            "{}; ./{SCRIPT_FILE} > {OUTPUT_FILE} 2>&1 < /dev/null",
            cd_exec_dir(ctx)
        )
    }

    async fn remote_id(&self, ctx: &ExecutionContext, _capture: &ExecCapture) -> AppResult<String> {
        let command = "singularity instance list";
        let listing = ctx.execute(command).await?;
        if listing.exit_code != 0 {
            return Err(failed_command(command, &listing));
        }
        let pid = extract::extract_instance_pid(&listing.stdout_lossy(), &ctx.job().uuid)?;
        Ok(pid.to_string())
    }

    async fn query_status(
        &self,
        ctx: &ExecutionContext,
        _remote_id: &str,
    ) -> AppResult<RemoteState> {
        remote_status::query_instance(ctx, &ctx.job().uuid).await
    }

    fn cancel_command(&self, ctx: &ExecutionContext, _remote_id: &str) -> String {
        format!("singularity instance stop {}", sh_escape(&ctx.job().uuid))
    }
}

fn failed_command(command: &str, capture: &ExecCapture) -> AppError {
    launch_error(format!(
        "launch command exited with code {}",
        capture.exit_code
    ))
    .with_context(format!(
        "command={command} stdout={} stderr={}",
        capture.stdout_lossy().trim(),
        capture.stderr_lossy().trim()
    ))
}

/// Throttle, run the launch command, extract and persist the remote id.
pub async fn launch_job(
    launcher: &dyn JobLauncher,
    ctx: &ExecutionContext,
    throttle: &LaunchThrottle,
    jobs: &dyn JobStorePort,
) -> AppResult<String> {
    let slept = throttle.acquire(ctx.host()).await;
    if !slept.is_zero() {
        tracing::info!(job = %ctx.job().uuid, "launch throttled for {slept:?}");
    }
    let command = launcher.launch_command(ctx);
    let capture = ctx.execute(&command).await?;
    if capture.exit_code != 0 {
        return Err(failed_command(&command, &capture));
    }
    let remote_id = launcher
        .remote_id(ctx, &capture)
        .await
        .map_err(|err| {
            let detail = format!("command={command} stdout={}", capture.stdout_lossy().trim());
            err.with_context(detail)
        })?;
    jobs.set_remote_job_id(&ctx.job().uuid, &remote_id).await?;
    tracing::info!(job = %ctx.job().uuid, remote_id, "job launched");
    Ok(remote_id)
}

/// Best-effort remote cancellation.
pub async fn cancel_remote(launcher: &dyn JobLauncher, ctx: &ExecutionContext, remote_id: &str) {
    let command = launcher.cancel_command(ctx, remote_id);
    match ctx.execute(&command).await {
        Ok(capture) if capture.exit_code == 0 => {}
        Ok(capture) => tracing::warn!(
            job = %ctx.job().uuid,
            "cancel command exited with {}: {}",
            capture.exit_code,
            capture.stderr_lossy().trim()
        ),
        Err(err) => tracing::warn!(job = %ctx.job().uuid, "cancel command failed: {err}"),
    }
}
