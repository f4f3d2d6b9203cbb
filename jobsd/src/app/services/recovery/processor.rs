// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Consumes the recovery queue and drives one runner task per recovery record.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::app::errors::{AppErrorKind, AppResult};
use crate::app::ports::{
    BlockOutcome, ClockPort, JobStorePort, RecoveryStorePort, RemoteExecPort, SystemStorePort,
    TelemetryEvent, TelemetryPort,
};
use crate::app::services::recovery::messages::{
    JobCancelRecoverMsg, JobRecoverMsg, RecoverMsg, RecoverShutdownMsg, ShutdownMode,
};
use crate::app::services::recovery::policies::policy_for;
use crate::app::services::recovery::testers::{TesterDeps, tester_for};
use crate::app::types::{
    Job, JobBlocked, JobStatus, NewJobBlocked, NewJobRecovery, RecoverConditionCode,
};

const BLOCK_ATTEMPTS: u32 = 3;
const STORE_RETRY_MIN: Duration = Duration::from_millis(500);
const STORE_RETRY_MAX: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct RecoveryDeps {
    pub recoveries: Arc<dyn RecoveryStorePort>,
    pub jobs: Arc<dyn JobStorePort>,
    pub systems: Arc<dyn SystemStorePort>,
    pub remote_exec: Arc<dyn RemoteExecPort>,
    pub clock: Arc<dyn ClockPort>,
    pub telemetry: Arc<dyn TelemetryPort>,
}

struct Runner {
    tenant: String,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct RecoveryProcessor {
    deps: Arc<RecoveryDeps>,
    runners: HashMap<i64, Runner>,
}

impl RecoveryProcessor {
    pub fn new(deps: RecoveryDeps) -> Self {
        Self {
            deps: Arc::new(deps),
            runners: HashMap::new(),
        }
    }

    /// Process messages until the queue closes or an all-tenant shutdown arrives.
    /// Call [`Self::resume_persisted`] first, before any engine sends a message.
    pub async fn run(mut self, mut rx: mpsc::Receiver<RecoverMsg>) -> AppResult<()> {
        while let Some(msg) = rx.recv().await {
            self.reap_finished();
            let header = msg.header();
            tracing::debug!(
                correlation_id = header.correlation_id,
                sender = %header.sender_id,
                "recovery message {}",
                msg.msg_type()
            );
            match msg {
                RecoverMsg::Recover(msg) => {
                    if let Err(err) = self.handle_recover(&msg).await {
                        tracing::warn!(job = %msg.job_uuid, "failed to block job: {err}");
                    }
                }
                RecoverMsg::CancelRecover(msg) => {
                    if let Err(err) = self.handle_cancel(&msg).await {
                        tracing::warn!(job = %msg.job_uuid, "failed to cancel recovery: {err}");
                    }
                }
                RecoverMsg::Shutdown(msg) => {
                    let all = msg.tenant.is_none();
                    self.handle_shutdown(&msg).await;
                    if all {
                        return Ok(());
                    }
                }
            }
        }
        tracing::info!("recovery queue closed; stopping runners");
        self.stop_runners(None, ShutdownMode::Graceful).await;
        Ok(())
    }

    pub async fn resume_persisted(&mut self) -> AppResult<()> {
        let records = self.deps.recoveries.list_recoveries().await?;
        if !records.is_empty() {
            tracing::info!("resuming {} recovery record(s)", records.len());
        }
        let attached: HashSet<String> = records
            .iter()
            .flat_map(|record| record.blocked.iter().map(|job| job.job_uuid.clone()))
            .collect();
        for record in records {
            self.ensure_runner(record.id, &record.tenant);
        }
        self.reactivate_orphans(&attached).await
    }

    /// Blocked jobs whose recover message never reached the store go back to the
    /// worker: to submission when already launched, otherwise to a fresh stage.
    async fn reactivate_orphans(&self, attached: &HashSet<String>) -> AppResult<()> {
        let blocked = self.deps.jobs.list_jobs_by_status(&[JobStatus::Blocked]).await?;
        for job in blocked.iter().filter(|job| !attached.contains(&job.uuid)) {
            let status = if job.remote_job_id.is_some() {
                JobStatus::SubmittingJob
            } else {
                JobStatus::Pending
            };
            tracing::warn!(
                job = %job.uuid,
                "blocked job has no recovery record; returning it to {status}"
            );
            self.deps
                .jobs
                .update_status(
                    &job.uuid,
                    status,
                    Some("recovery record lost; job reactivated"),
                )
                .await?;
        }
        Ok(())
    }

    /// Create or attach to the record for the message's tester hash.
    /// When the record cannot be written the job goes back to its success status,
    /// so it is retried by the worker instead of staying blocked without a record.
    pub async fn handle_recover(&mut self, msg: &JobRecoverMsg) -> AppResult<i64> {
        let (recovery, blocked) = msg.to_records();
        let outcome = match self.block_with_retry(&recovery, &blocked).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(
                    job = %msg.job_uuid,
                    "could not record blocked job, returning it to {}: {err}",
                    msg.success_status
                );
                self.deps
                    .jobs
                    .update_status(&msg.job_uuid, msg.success_status, Some(&msg.status_message))
                    .await?;
                return Err(err);
            }
        };
        tracing::info!(
            job = %msg.job_uuid,
            recovery = outcome.recovery_id,
            created = outcome.created,
            "job blocked on {}",
            msg.condition_code
        );
        self.ensure_runner(outcome.recovery_id, &msg.tenant);
        Ok(outcome.recovery_id)
    }

    async fn block_with_retry(
        &self,
        recovery: &NewJobRecovery,
        blocked: &NewJobBlocked,
    ) -> AppResult<BlockOutcome> {
        let mut delay = STORE_RETRY_MIN;
        let mut attempt = 1;
        loop {
            match self.deps.recoveries.block_job(recovery, blocked).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if attempt < BLOCK_ATTEMPTS => {
                    tracing::debug!(job = %blocked.job_uuid, attempt, "block_job failed: {err}");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn handle_cancel(&mut self, msg: &JobCancelRecoverMsg) -> AppResult<bool> {
        let Some(blocked) = self.deps.recoveries.unblock_job(&msg.job_uuid).await? else {
            tracing::warn!(job = %msg.job_uuid, "cancel requested for a job that is not blocked");
            return Ok(false);
        };
        self.deps
            .jobs
            .update_status(&blocked.job_uuid, msg.new_status, Some(&msg.status_message))
            .await?;
        self.deps.telemetry.event(
            "job.recovery_cancelled",
            TelemetryEvent {
                tenant: Some(msg.tenant.clone()),
                job_uuid: Some(blocked.job_uuid),
                status: Some(msg.new_status.to_string()),
                detail: Some(msg.status_message.clone()),
                ..Default::default()
            },
        );
        Ok(true)
    }

    async fn handle_shutdown(&mut self, msg: &RecoverShutdownMsg) {
        tracing::info!(
            tenant = msg.tenant.as_deref().unwrap_or("*"),
            mode = ?msg.mode,
            "recovery shutdown requested"
        );
        self.stop_runners(msg.tenant.as_deref(), msg.mode).await;
    }

    pub fn active_runners(&self) -> usize {
        self.runners
            .values()
            .filter(|runner| !runner.task.is_finished())
            .count()
    }

    fn reap_finished(&mut self) {
        self.runners.retain(|_, runner| !runner.task.is_finished());
    }

    fn ensure_runner(&mut self, recovery_id: i64, tenant: &str) {
        if self
            .runners
            .get(&recovery_id)
            .is_some_and(|runner| !runner.task.is_finished())
        {
            return;
        }
        let (stop, stop_rx) = watch::channel(false);
        let deps = self.deps.clone();
        let task = tokio::spawn(async move {
            if let Err(err) = drive_recovery(&deps, recovery_id, stop_rx).await {
                tracing::warn!(recovery = recovery_id, "recovery runner failed: {err}");
            }
        });
        self.runners.insert(
            recovery_id,
            Runner {
                tenant: tenant.to_string(),
                stop,
                task,
            },
        );
    }

    async fn stop_runners(&mut self, tenant: Option<&str>, mode: ShutdownMode) {
        let ids: Vec<i64> = self
            .runners
            .iter()
            .filter(|(_, runner)| tenant.is_none_or(|t| runner.tenant == t))
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            let Some(runner) = self.runners.remove(&id) else {
                continue;
            };
            match mode {
                ShutdownMode::Forced => runner.task.abort(),
                ShutdownMode::Graceful => {
                    let _ = runner.stop.send(true);
                    if let Err(err) = runner.task.await {
                        tracing::warn!(recovery = id, "recovery runner ended abnormally: {err}");
                    }
                }
            }
        }
    }
}

async fn drive_recovery(
    deps: &RecoveryDeps,
    recovery_id: i64,
    mut stop: watch::Receiver<bool>,
) -> AppResult<()> {
    let Some(recovery) = deps.recoveries.get_recovery(recovery_id).await? else {
        return Ok(());
    };
    let mut policy = policy_for(&recovery, deps.clock.clone())?;
    let tester = tester_for(
        &recovery,
        &TesterDeps {
            systems: deps.systems.clone(),
            jobs: deps.jobs.clone(),
            remote_exec: deps.remote_exec.clone(),
        },
    )?;
    let condition = recovery.condition_code;

    loop {
        let Some(wait) = policy.millis_to_wait() else {
            let reason = policy
                .reason_code()
                .map(|r| r.to_string())
                .unwrap_or_default();
            let message = format!(
                "recovery from {condition} abandoned ({reason}) after {} attempts",
                policy.attempts()
            );
            let resolved = retry_store(recovery_id, &mut stop, || {
                deps.recoveries.resolve_recovery(recovery_id)
            })
            .await?;
            if let Some(blocked) = resolved {
                release(deps, &blocked, false, &message).await;
            }
            return Ok(());
        };

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(wait)) => {}
            _ = stop.changed() => {
                tracing::debug!(recovery = recovery_id, "recovery runner stopping");
                return Ok(());
            }
        }

        let incremented = retry_store(recovery_id, &mut stop, || {
            deps.recoveries.increment_recovery_attempts(recovery_id)
        })
        .await;
        match incremented {
            Ok(Some(_)) => {}
            Ok(None) => return Ok(()),
            // Every job was detached since the last attempt.
            Err(err) if err.kind() == AppErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err),
        }
        let Some(Some(current)) = retry_store(recovery_id, &mut stop, || {
            deps.recoveries.get_recovery(recovery_id)
        })
        .await?
        else {
            return Ok(());
        };
        if detach_cancelled(deps, &current.blocked, condition).await == 0 {
            // The record goes with its last job; a job attached since keeps it alive.
            let Some(Some(_)) = retry_store(recovery_id, &mut stop, || {
                deps.recoveries.get_recovery(recovery_id)
            })
            .await?
            else {
                return Ok(());
            };
        }

        match tester.can_unblock().await {
            Ok(true) => {
                let resolved = retry_store(recovery_id, &mut stop, || {
                    deps.recoveries.resolve_recovery(recovery_id)
                })
                .await?;
                if let Some(blocked) = resolved {
                    let message = format!("recovered from {condition}");
                    release(deps, &blocked, true, &message).await;
                }
                return Ok(());
            }
            Ok(false) => {
                tracing::debug!(recovery = recovery_id, "{condition} persists");
            }
            Err(err) => {
                tracing::warn!(recovery = recovery_id, "recovery tester failed: {err}");
            }
        }
    }
}

/// Retry a store call with a doubling delay while it fails with an internal error.
/// `Ok(None)` means the runner was told to stop first.
async fn retry_store<T, F, Fut>(
    recovery_id: i64,
    stop: &mut watch::Receiver<bool>,
    mut call: F,
) -> AppResult<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut delay = STORE_RETRY_MIN;
    loop {
        match call().await {
            Ok(value) => return Ok(Some(value)),
            Err(err) if err.kind() == AppErrorKind::Internal => {
                tracing::warn!(
                    recovery = recovery_id,
                    "store call failed, retrying in {delay:?}: {err}"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = stop.changed() => return Ok(None),
                }
                delay = (delay * 2).min(STORE_RETRY_MAX);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Release the jobs whose cancellation was requested while they were blocked.
/// Returns how many jobs stay attached.
async fn detach_cancelled(
    deps: &RecoveryDeps,
    blocked: &[JobBlocked],
    condition: RecoverConditionCode,
) -> usize {
    let mut remaining = blocked.len();
    for entry in blocked {
        let flagged = match deps.jobs.get_job(&entry.job_uuid).await {
            Ok(job) => job.is_some_and(|job| job.cancel_requested),
            Err(err) => {
                tracing::warn!(job = %entry.job_uuid, "could not read blocked job: {err}");
                false
            }
        };
        if !flagged {
            continue;
        }
        match deps.recoveries.unblock_job(&entry.job_uuid).await {
            Ok(Some(detached)) => {
                let message = format!("cancelled while blocked on {condition}");
                release(deps, &[detached], false, &message).await;
                remaining -= 1;
            }
            Ok(None) => remaining -= 1,
            Err(err) => {
                tracing::warn!(job = %entry.job_uuid, "could not detach cancelled job: {err}");
            }
        }
    }
    remaining
}

/// Where a released job goes next. A job flagged for cancellation ends CANCELLED,
/// unless a remote job still has to be stopped: then it returns to the worker,
/// which issues the remote cancel before finishing it.
fn release_status(
    job: Option<&Job>,
    blocked: &JobBlocked,
    recovered: bool,
) -> (JobStatus, &'static str) {
    match job {
        Some(job) if job.cancel_requested && job.remote_job_id.is_some() => {
            (blocked.success_status, "job.cancel_pending")
        }
        Some(job) if job.cancel_requested => (JobStatus::Cancelled, "job.cancelled"),
        _ if recovered => (blocked.success_status, "job.recovered"),
        _ => (JobStatus::Failed, "job.failed"),
    }
}

/// Move released jobs on: to their success status when `recovered`, else to FAILED.
/// Cancellation requests take precedence, see [`release_status`].
async fn release(deps: &RecoveryDeps, blocked: &[JobBlocked], recovered: bool, message: &str) {
    for entry in blocked {
        let job = match deps.jobs.get_job(&entry.job_uuid).await {
            Ok(job) => job,
            Err(err) => {
                tracing::warn!(job = %entry.job_uuid, "could not read released job: {err}");
                None
            }
        };
        let (status, event) = release_status(job.as_ref(), entry, recovered);
        if let Err(err) = deps
            .jobs
            .update_status(&entry.job_uuid, status, Some(message))
            .await
        {
            tracing::warn!(job = %entry.job_uuid, "failed to release blocked job: {err}");
            continue;
        }
        deps.telemetry.event(
            event,
            TelemetryEvent {
                job_uuid: Some(entry.job_uuid.clone()),
                status: Some(status.to_string()),
                detail: Some(message.to_string()),
                ..Default::default()
            },
        );
    }
}
