// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Stepwise backoff policy for remote status polling.
//!
//! The policy is lazily initialized on the first wait request: it replays the
//! job's persisted check counters against the schedule and, for a job already
//! running, arms the execution clock. Once it reports a reason code it hands out
//! no further wait times.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::app::ports::ClockPort;
use crate::app::services::backoff::{ReasonCode, StepCursor};
use crate::app::services::monitor::parameters::MonitorPolicyParameters;
use crate::app::types::{Job, JobStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyState {
    pub cursor: StepCursor,
    pub started_at: OffsetDateTime,
    pub clock_started: bool,
    pub run_end: Option<OffsetDateTime>,
    pub failure_run_start: Option<OffsetDateTime>,
}

impl PolicyState {
    fn start_clock(&mut self, params: &MonitorPolicyParameters, now: OffsetDateTime) {
        if self.clock_started {
            return;
        }
        self.clock_started = true;
        if params.max_elapsed_secs > 0 {
            self.run_end = Some(now + time::Duration::seconds(params.max_elapsed_secs as i64));
        }
    }
}

/// One policy evaluation. Pure apart from mutating `state`.
pub fn next_wait(
    state: &mut PolicyState,
    params: &MonitorPolicyParameters,
    now: OffsetDateTime,
    last_attempt_failed: bool,
) -> Result<u64, ReasonCode> {
    if last_attempt_failed {
        let run_start = *state.failure_run_start.get_or_insert(now);
        let limit = time::Duration::minutes(params.max_consecutive_failure_minutes as i64);
        if now - run_start > limit {
            return Err(ReasonCode::TooManyFailures);
        }
    } else {
        state.failure_run_start = None;
    }

    if state.run_end.is_some_and(|end| now >= end) {
        return Err(ReasonCode::TimeExpired);
    }

    state
        .cursor
        .next_delay(&params.steps)
        .ok_or(ReasonCode::TooManyAttempts)
}

pub struct StepwiseMonitorPolicy {
    params: MonitorPolicyParameters,
    clock: Arc<dyn ClockPort>,
    status: JobStatus,
    prior_checks: u64,
    state: Option<PolicyState>,
    reason: Option<ReasonCode>,
    queuing_retries: u32,
}

impl StepwiseMonitorPolicy {
    pub fn new(job: &Job, params: MonitorPolicyParameters, clock: Arc<dyn ClockPort>) -> Self {
        Self {
            params,
            clock,
            status: job.status,
            prior_checks: job.remote_checks(),
            state: None,
            reason: None,
            queuing_retries: 0,
        }
    }

    fn initial_state(&self, now: OffsetDateTime) -> PolicyState {
        let mut state = PolicyState {
            cursor: StepCursor::replay(&self.params.steps, self.prior_checks),
            started_at: now,
            clock_started: false,
            run_end: None,
            failure_run_start: None,
        };
        if self.status == JobStatus::Running {
            state.start_clock(&self.params, now);
        }
        state
    }

    fn ensure_initialized(&mut self, now: OffsetDateTime) {
        if self.state.is_none() {
            self.state = Some(self.initial_state(now));
        }
    }

    /// Milliseconds to wait before the next status check, or `None` with a reason code set.
    pub fn millis_to_wait(&mut self, last_attempt_failed: bool) -> Option<u64> {
        if let Some(reason) = self.reason {
            tracing::warn!(%reason, "monitor policy asked for a wait time after it stopped");
            return None;
        }
        let now = self.clock.now_utc();
        self.ensure_initialized(now);
        let state = self.state.as_mut()?;
        match next_wait(state, &self.params, now, last_attempt_failed) {
            Ok(wait) => Some(wait),
            Err(reason) => {
                tracing::debug!(%reason, cursor = ?state.cursor, "monitor policy stopped");
                self.reason = Some(reason);
                None
            }
        }
    }

    pub fn reason_code(&self) -> Option<ReasonCode> {
        self.reason
    }

    pub fn cursor(&self) -> StepCursor {
        match &self.state {
            Some(state) => state.cursor,
            None => StepCursor::replay(&self.params.steps, self.prior_checks),
        }
    }

    pub fn started_at(&self) -> Option<OffsetDateTime> {
        self.state.as_ref().map(|s| s.started_at)
    }

    /// Keep the connection open while the current step polls faster than the threshold.
    pub fn keep_connection(&self) -> bool {
        self.cursor()
            .current_step(&self.params.steps)
            .is_some_and(|step| step.delay_millis < self.params.step_connection_close_millis)
    }

    /// Sleep briefly and ask for the same poll again while a just-submitted job has
    /// not surfaced in the scheduler yet. Only the very first poll of a queued job qualifies.
    pub async fn retry_for_initial_queuing(&mut self) -> bool {
        if self.status != JobStatus::Queued
            || self.queuing_retries >= self.params.initial_queuing_retries
        {
            return false;
        }
        let cursor = self.cursor();
        if cursor.index != 0 || cursor.tries > 1 {
            return false;
        }
        self.queuing_retries += 1;
        tokio::time::sleep(self.params.initial_queuing_delay).await;
        true
    }

    /// Arm the execution clock at the queued to running transition. Idempotent.
    pub fn start_job_execution_timer(&mut self) {
        self.status = JobStatus::Running;
        let now = self.clock.now_utc();
        self.ensure_initialized(now);
        if let Some(state) = self.state.as_mut() {
            state.start_clock(&self.params, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::clock::ManualClock;
    use crate::app::services::backoff::Step;
    use crate::app::services::monitor::parameters::MonitorSettings;
    use crate::app::testing::sample_job;
    use crate::app::types::{JobType, Runtime};
    use time::macros::datetime;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(datetime!(2026-03-01 12:00 UTC)))
    }

    fn policy(job: &Job, scheduled: bool, clock: Arc<ManualClock>) -> StepwiseMonitorPolicy {
        let params = MonitorPolicyParameters::for_job(job, scheduled, &MonitorSettings::default());
        StepwiseMonitorPolicy::new(job, params, clock)
    }

    #[test]
    fn queued_job_walks_default_schedule() {
        let job = sample_job(JobType::Batch, Runtime::Docker, JobStatus::Queued);
        let mut p = policy(&job, true, clock());
        assert_eq!(p.millis_to_wait(false), Some(1_000));
        for _ in 0..5 {
            assert_eq!(p.millis_to_wait(false), Some(10_000));
        }
        assert_eq!(p.millis_to_wait(false), Some(60_000));
        assert_eq!(p.cursor(), StepCursor { index: 2, tries: 1 });
    }

    #[test]
    fn continuous_failures_stop_with_too_many_failures() {
        let job = sample_job(JobType::Batch, Runtime::Docker, JobStatus::Queued);
        let clock = clock();
        let mut p = policy(&job, true, clock.clone());
        assert!(p.millis_to_wait(true).is_some());
        clock.advance(time::Duration::minutes(1_000));
        assert!(p.millis_to_wait(true).is_some());
        clock.advance(time::Duration::minutes(441));
        assert_eq!(p.millis_to_wait(true), None);
        assert_eq!(p.reason_code(), Some(ReasonCode::TooManyFailures));
        assert_eq!(p.millis_to_wait(false), None);
    }

    #[test]
    fn success_resets_failure_run() {
        let job = sample_job(JobType::Batch, Runtime::Docker, JobStatus::Queued);
        let clock = clock();
        let mut p = policy(&job, true, clock.clone());
        assert!(p.millis_to_wait(true).is_some());
        clock.advance(time::Duration::minutes(1_400));
        assert!(p.millis_to_wait(false).is_some());
        assert!(p.millis_to_wait(true).is_some());
        clock.advance(time::Duration::minutes(100));
        assert!(p.millis_to_wait(true).is_some());
        assert_eq!(p.reason_code(), None);
    }

    #[test]
    fn resumes_from_persisted_check_counters() {
        let mut job = sample_job(JobType::Batch, Runtime::Docker, JobStatus::Queued);
        job.remote_checks_success = 4;
        job.remote_checks_failed = 2;
        let mut p = policy(&job, true, clock());
        assert_eq!(p.millis_to_wait(false), Some(60_000));
    }

    #[test]
    fn running_job_expires_after_budget() {
        let mut job = sample_job(JobType::Fork, Runtime::Docker, JobStatus::Running);
        job.max_minutes = 1;
        let clock = clock();
        let mut p = policy(&job, false, clock.clone());
        assert!(p.millis_to_wait(false).is_some());
        clock.advance(time::Duration::seconds(60));
        assert_eq!(p.millis_to_wait(false), None);
        assert_eq!(p.reason_code(), Some(ReasonCode::TimeExpired));
    }

    #[test]
    fn queued_job_clock_starts_on_transition_only_once() {
        let mut job = sample_job(JobType::Batch, Runtime::Docker, JobStatus::Queued);
        job.max_minutes = 1;
        let clock = clock();
        let mut p = policy(&job, false, clock.clone());
        assert!(p.millis_to_wait(false).is_some());
        clock.advance(time::Duration::minutes(30));
        assert!(p.millis_to_wait(false).is_some());

        p.start_job_execution_timer();
        clock.advance(time::Duration::seconds(40));
        p.start_job_execution_timer();
        assert!(p.millis_to_wait(false).is_some());
        clock.advance(time::Duration::seconds(20));
        assert_eq!(p.millis_to_wait(false), None);
        assert_eq!(p.reason_code(), Some(ReasonCode::TimeExpired));
    }

    #[test]
    fn finite_schedule_ends_with_too_many_attempts() {
        let job = sample_job(JobType::Batch, Runtime::Docker, JobStatus::Queued);
        let mut params =
            MonitorPolicyParameters::for_job(&job, true, &MonitorSettings::default());
        params.steps = vec![Step::new(2, 10), Step::new(3, 20)];
        let mut p = StepwiseMonitorPolicy::new(&job, params, clock());
        let mut non_null = 0;
        while p.millis_to_wait(false).is_some() {
            non_null += 1;
        }
        assert_eq!(non_null, 5);
        assert_eq!(p.reason_code(), Some(ReasonCode::TooManyAttempts));
    }

    #[test]
    fn keep_connection_tracks_current_step_delay() {
        let mut job = sample_job(JobType::Batch, Runtime::Docker, JobStatus::Queued);
        let p = policy(&job, true, clock());
        assert!(p.keep_connection());
        job.remote_checks_success = 7;
        let p = policy(&job, true, clock());
        assert!(!p.keep_connection());
    }

    #[tokio::test(start_paused = true)]
    async fn initial_queuing_retries_are_bounded() {
        let job = sample_job(JobType::Batch, Runtime::Docker, JobStatus::Queued);
        let mut p = policy(&job, true, clock());
        assert_eq!(p.millis_to_wait(false), Some(1_000));
        let start = tokio::time::Instant::now();
        let mut retries = 0;
        while p.retry_for_initial_queuing().await {
            retries += 1;
        }
        assert_eq!(retries, 15);
        assert!(start.elapsed() >= std::time::Duration::from_secs(15));

        let running = sample_job(JobType::Batch, Runtime::Docker, JobStatus::Running);
        let mut p = policy(&running, true, clock());
        assert!(!p.retry_for_initial_queuing().await);
    }
}
