// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::time::Duration;

use serde::Deserialize;

use crate::app::services::backoff::Step;
use crate::app::types::{Job, JobStatus};

/// Fast polling first, settling into a ten minute cadence.
pub const DEFAULT_MONITOR_STEPS: [Step; 6] = [
    Step::new(1, 1_000),
    Step::new(5, 10_000),
    Step::new(10, 60_000),
    Step::new(100, 180_000),
    Step::new(100, 300_000),
    Step::new(0, 600_000),
];

/// Process-wide monitor tuning, loaded from the `[monitor]` config table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub keep_connection_threshold_millis: u64,
    pub max_consecutive_failure_minutes: u64,
    pub scheduler_extension_minutes: u64,
    pub initial_queuing_retries: u32,
    pub initial_queuing_delay_millis: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            keep_connection_threshold_millis: 60_000,
            max_consecutive_failure_minutes: 1_440,
            scheduler_extension_minutes: 10,
            initial_queuing_retries: 15,
            initial_queuing_delay_millis: 1_000,
        }
    }
}

/// Immutable inputs of one monitoring session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorPolicyParameters {
    pub steps: Vec<Step>,
    /// Ceiling on the execution clock; zero means unlimited.
    pub max_elapsed_secs: u64,
    pub step_connection_close_millis: u64,
    pub max_consecutive_failure_minutes: u64,
    pub initial_queuing_retries: u32,
    pub initial_queuing_delay: Duration,
}

impl MonitorPolicyParameters {
    pub fn new(settings: &MonitorSettings, max_elapsed_secs: u64) -> Self {
        Self {
            steps: DEFAULT_MONITOR_STEPS.to_vec(),
            max_elapsed_secs,
            step_connection_close_millis: settings.keep_connection_threshold_millis,
            max_consecutive_failure_minutes: settings.max_consecutive_failure_minutes,
            initial_queuing_retries: settings.initial_queuing_retries,
            initial_queuing_delay: Duration::from_millis(settings.initial_queuing_delay_millis),
        }
    }

    /// Derive the ceiling from the job's wall-clock budget. Scheduled jobs get an
    /// extension so the local monitor times out after the scheduler would.
    pub fn for_job(job: &Job, scheduled: bool, settings: &MonitorSettings) -> Self {
        let monitored = matches!(job.status, JobStatus::Queued | JobStatus::Running);
        let max_elapsed_secs = if monitored && job.max_minutes > 0 {
            let mut minutes = job.max_minutes as u64;
            if scheduled {
                minutes += settings.scheduler_extension_minutes;
            }
            minutes * 60
        } else {
            0
        };
        Self::new(settings, max_elapsed_secs)
    }
}
