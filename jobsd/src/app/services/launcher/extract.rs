// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Remote identifier extraction from launch command output.

use std::sync::LazyLock;

use regex::Regex;

use crate::app::errors::{AppError, AppErrorKind, codes};

static SUBMITTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*Submitted batch job (\d+)\s*$").expect("submission pattern compiles")
});

pub fn launch_error(message: impl Into<String>) -> AppError {
    AppError::with_message(AppErrorKind::Aborted, codes::LAUNCH_ERROR, message)
}

/// Direct-PID runtimes print the PID of the detached wrapper.
pub fn extract_pid(stdout: &str) -> Result<u64, AppError> {
    let trimmed = stdout.trim();
    trimmed
        .parse::<u64>()
        .map_err(|_| launch_error(format!("expected a process id, got '{trimmed}'")))
}

/// `sbatch` confirms with `Submitted batch job <id>`.
pub fn extract_batch_job_id(stdout: &str) -> Result<String, AppError> {
    SUBMITTED_RE
        .captures(stdout)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| {
            launch_error(format!(
                "unexpected batch submission response '{}'",
                stdout.trim()
            ))
        })
}

/// The identifier is the token right after the instance name in an instance listing.
pub fn extract_instance_pid(listing: &str, instance: &str) -> Result<u64, AppError> {
    let mut tokens = listing.split_whitespace();
    tokens
        .by_ref()
        .find(|token| *token == instance)
        .ok_or_else(|| launch_error(format!("instance {instance} not found in instance listing")))?;
    let token = tokens
        .next()
        .ok_or_else(|| launch_error(format!("instance {instance} listed without a process id")))?;
    token.parse::<u64>().map_err(|_| {
        launch_error(format!(
            "instance {instance} listed with malformed process id '{token}'"
        ))
    })
}
