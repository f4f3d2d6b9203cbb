// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use tokio::sync::watch;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes, internal_error, unavailable};
use crate::app::ports::{
    ClockPort, JobStorePort, RecoveryQueuePort, RemoteExecPort, SystemStorePort, TelemetryEvent,
    TelemetryPort,
};
use crate::app::services::backoff::ReasonCode;
use crate::app::services::context::ExecutionContext;
use crate::app::services::launcher::{self, LaunchThrottle};
use crate::app::services::monitor::{
    MonitorPolicyParameters, MonitorSettings, RemoteState, StepwiseMonitorPolicy,
};
use crate::app::services::recovery::configs::classify;
use crate::app::services::recovery::{JobCancelRecoverMsg, JobRecoverMsg, MsgHeader, RecoverMsg};
use crate::app::services::registry::{RuntimeBinding, RuntimeRegistry};
use crate::app::services::stager;
use crate::app::types::{Job, JobStatus};

/// Statuses the worker loop picks up; blocked jobs belong to the recovery processor.
pub const ACTIONABLE_STATUSES: [JobStatus; 5] = [
    JobStatus::Pending,
    JobStatus::StagingJob,
    JobStatus::SubmittingJob,
    JobStatus::Queued,
    JobStatus::Running,
];

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub sender_id: String,
    pub poll_interval: Duration,
    pub monitor: MonitorSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sender_id: format!("jobsd-{}", std::process::id()),
            poll_interval: Duration::from_secs(10),
            monitor: MonitorSettings::default(),
        }
    }
}

#[derive(Clone)]
pub struct JobEngine {
    pub(crate) jobs: Arc<dyn JobStorePort>,
    pub(crate) systems: Arc<dyn SystemStorePort>,
    pub(crate) remote_exec: Arc<dyn RemoteExecPort>,
    pub(crate) recovery_queue: Arc<dyn RecoveryQueuePort>,
    pub(crate) clock: Arc<dyn ClockPort>,
    pub(crate) telemetry: Arc<dyn TelemetryPort>,
    pub(crate) throttle: Arc<LaunchThrottle>,
    pub(crate) registry: Arc<RuntimeRegistry>,
    pub(crate) settings: EngineSettings,
    in_flight: Arc<DashSet<String>>,
}

impl JobEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        jobs: Arc<dyn JobStorePort>,
        systems: Arc<dyn SystemStorePort>,
        remote_exec: Arc<dyn RemoteExecPort>,
        recovery_queue: Arc<dyn RecoveryQueuePort>,
        clock: Arc<dyn ClockPort>,
        telemetry: Arc<dyn TelemetryPort>,
        throttle: Arc<LaunchThrottle>,
        registry: Arc<RuntimeRegistry>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            jobs,
            systems,
            remote_exec,
            recovery_queue,
            clock,
            telemetry,
            throttle,
            registry,
            settings,
            in_flight: Arc::new(DashSet::new()),
        }
    }

    /// Drive one job from its persisted status as far as it goes in this attempt.
    /// Returns the status the job was left in.
    pub async fn process_job(&self, uuid: &str) -> AppResult<JobStatus> {
        let job = self.load_job(uuid).await?;
        if job.status.is_terminal() || job.status == JobStatus::Blocked {
            return Ok(job.status);
        }
        if job.cancel_requested && job.remote_job_id.is_none() {
            self.finish(&job, JobStatus::Cancelled, "job cancelled before launch")
                .await?;
            return Ok(JobStatus::Cancelled);
        }
        let Some(system) = self
            .systems
            .get_system(&job.tenant, &job.exec_system_id)
            .await?
        else {
            let err = AppError::with_message(
                AppErrorKind::NotFound,
                codes::NOT_FOUND,
                format!("execution system {} not found", job.exec_system_id),
            );
            return self.fail(&job, &err).await;
        };
        let binding = match self.registry.resolve_job(&job, &system) {
            Ok(binding) => binding,
            Err(err) => return self.fail(&job, &err).await,
        };
        tracing::debug!(
            job = %job.uuid,
            runtime = binding.name,
            status = %job.status,
            "processing job"
        );

        let ctx = ExecutionContext::new(job, system, self.remote_exec.clone());
        let mut stage = ctx.job().status;
        match self.drive(&ctx, &binding, &mut stage).await {
            Ok(status) => Ok(status),
            Err(err) => self.handle_failure(&ctx, &binding, stage, err).await,
        }
    }

    /// Blocked jobs leave recovery through the processor; others are flagged for the monitor.
    pub async fn cancel_job(&self, uuid: &str) -> AppResult<bool> {
        let job = self.load_job(uuid).await?;
        if job.status.is_terminal() {
            return Ok(false);
        }
        if job.status == JobStatus::Blocked {
            self.recovery_queue
                .send(RecoverMsg::CancelRecover(JobCancelRecoverMsg {
                    header: MsgHeader::new(&self.settings.sender_id),
                    tenant: job.tenant.clone(),
                    job_uuid: job.uuid.clone(),
                    new_status: JobStatus::Cancelled,
                    status_message: "job cancelled while blocked".to_string(),
                }))
                .await?;
            return Ok(true);
        }
        self.jobs.request_cancel(uuid).await
    }

    /// Scan for actionable jobs every poll interval until `shutdown` flips.
    pub async fn run_worker(&self, mut shutdown: watch::Receiver<bool>) -> AppResult<()> {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    tracing::info!("job worker stopping");
                    return Ok(());
                }
            }
            match self.dispatch_actionable().await {
                Ok(0) => {}
                Ok(started) => tracing::debug!("dispatched {started} job(s)"),
                Err(err) => tracing::warn!("job scan failed: {err}"),
            }
        }
    }

    /// Spawn one task per actionable job not already being processed.
    pub async fn dispatch_actionable(&self) -> AppResult<usize> {
        let jobs = self.jobs.list_jobs_by_status(&ACTIONABLE_STATUSES).await?;
        let mut started = 0;
        for job in jobs {
            if !self.in_flight.insert(job.uuid.clone()) {
                continue;
            }
            started += 1;
            let engine = self.clone();
            tokio::spawn(async move {
                let uuid = job.uuid;
                match engine.process_job(&uuid).await {
                    Ok(status) => tracing::debug!(job = %uuid, %status, "job processing pass done"),
                    Err(err) => tracing::warn!(job = %uuid, "job processing failed: {err}"),
                }
                engine.in_flight.remove(&uuid);
            });
        }
        Ok(started)
    }

    async fn drive(
        &self,
        ctx: &ExecutionContext,
        binding: &RuntimeBinding,
        stage: &mut JobStatus,
    ) -> AppResult<JobStatus> {
        if matches!(*stage, JobStatus::Pending | JobStatus::StagingJob) {
            self.transition(ctx, stage, JobStatus::StagingJob, None).await?;
            stager::stage_job(binding.stager.as_ref(), ctx).await?;
            self.emit("job.staged", ctx.job(), JobStatus::StagingJob, None);
            self.transition(ctx, stage, JobStatus::SubmittingJob, None)
                .await?;
        }

        let remote_id = if *stage == JobStatus::SubmittingJob {
            let remote_id = match ctx.job().remote_job_id.clone() {
                Some(id) => {
                    tracing::info!(job = %ctx.job().uuid, remote_id = %id, "job already launched");
                    id
                }
                None => {
                    self.check_launch_preconditions(ctx).await?;
                    launcher::launch_job(
                        binding.launcher.as_ref(),
                        ctx,
                        &self.throttle,
                        self.jobs.as_ref(),
                    )
                    .await?
                }
            };
            let launched = binding.launcher.launched_status();
            let message = format!("launched with remote id {remote_id}");
            self.transition(ctx, stage, launched, Some(&message)).await?;
            self.emit("job.launched", ctx.job(), launched, Some(remote_id.clone()));
            remote_id
        } else {
            ctx.job().remote_job_id.clone().ok_or_else(|| {
                internal_error(format!(
                    "job {} is {} without a remote id",
                    ctx.job().uuid,
                    stage
                ))
            })?
        };

        self.monitor(ctx, binding, stage, &remote_id).await
    }

    async fn check_launch_preconditions(&self, ctx: &ExecutionContext) -> AppResult<()> {
        let system = ctx.system();
        let job = ctx.job();
        if !system.enabled {
            return Err(unavailable(
                codes::SYSTEM_NOT_AVAILABLE,
                format!("execution system {} is not available", system.id),
            ));
        }
        if let Some(limit) = system.max_jobs_per_user.filter(|limit| *limit > 0) {
            // The submitting job itself is already counted as active.
            let active = self
                .jobs
                .count_active_jobs(&job.tenant, &system.id, &job.owner)
                .await?;
            if active > limit {
                return Err(unavailable(
                    codes::QUOTA_EXCEEDED,
                    format!(
                        "user {} has {} active jobs on {}; the limit is {limit}",
                        job.owner,
                        active - 1,
                        system.id
                    ),
                ));
            }
        }
        Ok(())
    }

    async fn monitor(
        &self,
        ctx: &ExecutionContext,
        binding: &RuntimeBinding,
        stage: &mut JobStatus,
        remote_id: &str,
    ) -> AppResult<JobStatus> {
        let launcher = binding.launcher.as_ref();
        let uuid = ctx.job().uuid.as_str();
        let mut snapshot = ctx.job().clone();
        snapshot.status = *stage;
        let params = MonitorPolicyParameters::for_job(
            &snapshot,
            launcher.scheduled(),
            &self.settings.monitor,
        );
        let mut policy = StepwiseMonitorPolicy::new(&snapshot, params, self.clock.clone());
        let mut checks = (snapshot.remote_checks_success, snapshot.remote_checks_failed);
        let mut last_failed = false;

        loop {
            if self.cancel_requested(uuid).await? {
                launcher::cancel_remote(launcher, ctx, remote_id).await;
                self.finish(ctx.job(), JobStatus::Cancelled, "job cancelled by request")
                    .await?;
                return Ok(JobStatus::Cancelled);
            }

            let Some(wait) = policy.millis_to_wait(last_failed) else {
                let reason = policy.reason_code();
                if reason == Some(ReasonCode::TimeExpired) {
                    launcher::cancel_remote(launcher, ctx, remote_id).await;
                }
                let message = format!(
                    "monitoring stopped ({}) after {} successful and {} failed status checks",
                    reason.map(|r| r.as_str()).unwrap_or("UNKNOWN"),
                    checks.0,
                    checks.1
                );
                self.finish(ctx.job(), JobStatus::Failed, &message).await?;
                return Ok(JobStatus::Failed);
            };

            if !policy.keep_connection() {
                if let Some(session) = ctx.ssh_config().session_name.as_deref() {
                    if let Err(err) = self.remote_exec.remove_session(session).await {
                        tracing::debug!(job = %uuid, "failed to close session {session}: {err}");
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(wait)).await;

            let queried = loop {
                match launcher.query_status(ctx, remote_id).await {
                    Ok(RemoteState::NotFound) if policy.retry_for_initial_queuing().await => {
                        tracing::debug!(job = %uuid, "remote job not visible yet; retrying");
                    }
                    other => break other,
                }
            };
            let state = match queried {
                Ok(RemoteState::NotFound) => {
                    tracing::warn!(job = %uuid, remote_id, "remote job not found");
                    None
                }
                Ok(state) => Some(state),
                Err(err) if err.is_transient() => return Err(err),
                Err(err) => {
                    tracing::warn!(job = %uuid, "status check failed: {err}");
                    None
                }
            };
            last_failed = state.is_none();
            self.jobs.record_remote_check(uuid, !last_failed).await?;
            if last_failed {
                checks.1 += 1;
            } else {
                checks.0 += 1;
            }

            match state {
                None | Some(RemoteState::Queued) | Some(RemoteState::NotFound) => {}
                Some(RemoteState::Running) => {
                    if *stage == JobStatus::Queued {
                        self.transition(ctx, stage, JobStatus::Running, None).await?;
                        policy.start_job_execution_timer();
                        self.emit("job.running", ctx.job(), JobStatus::Running, None);
                    }
                }
                Some(RemoteState::Done) => {
                    self.finish(ctx.job(), JobStatus::Done, "job completed")
                        .await?;
                    return Ok(JobStatus::Done);
                }
                Some(RemoteState::Failed(detail)) => {
                    let message = format!("remote job {remote_id} failed: {detail}");
                    self.finish(ctx.job(), JobStatus::Failed, &message).await?;
                    return Ok(JobStatus::Failed);
                }
            }
        }
    }

    /// Route transient failures into recovery; everything else fails the job.
    /// A job flagged for cancellation is finished instead of blocked. When the
    /// queue is gone the job stays BLOCKED and start-up reactivation picks it up.
    async fn handle_failure(
        &self,
        ctx: &ExecutionContext,
        binding: &RuntimeBinding,
        stage: JobStatus,
        err: AppError,
    ) -> AppResult<JobStatus> {
        let job = ctx.job();
        let first_contact = matches!(stage, JobStatus::Pending | JobStatus::StagingJob);
        let Some(config) = classify(&err, first_contact) else {
            return self.fail(job, &err).await;
        };
        let current = self.load_job(&job.uuid).await?;
        if current.cancel_requested {
            if let Some(remote_id) = current.remote_job_id.as_deref() {
                launcher::cancel_remote(binding.launcher.as_ref(), ctx, remote_id).await;
            }
            let message = format!("job cancelled by request ({err})");
            self.finish(job, JobStatus::Cancelled, &message).await?;
            return Ok(JobStatus::Cancelled);
        }
        let msg = JobRecoverMsg::new(
            config,
            job,
            config.tester_params(job, ctx.system()),
            stage,
            format!("{}: {err}", config.condition_code),
            &self.settings.sender_id,
        );
        tracing::info!(
            job = %job.uuid,
            correlation_id = msg.header.correlation_id,
            "blocking job on {} (resume as {stage})",
            config.name
        );
        let status_message = msg.status_message.clone();
        self.jobs
            .update_status(&job.uuid, JobStatus::Blocked, Some(&status_message))
            .await?;
        if let Err(send_err) = self.recovery_queue.send(RecoverMsg::Recover(msg)).await {
            tracing::warn!(
                job = %job.uuid,
                "recovery queue unavailable, job stays blocked until restart: {send_err}"
            );
            return Ok(JobStatus::Blocked);
        }
        self.emit(
            "job.blocked",
            job,
            JobStatus::Blocked,
            Some(status_message),
        );
        Ok(JobStatus::Blocked)
    }

    async fn load_job(&self, uuid: &str) -> AppResult<Job> {
        self.jobs.get_job(uuid).await?.ok_or_else(|| {
            AppError::with_message(
                AppErrorKind::NotFound,
                codes::NOT_FOUND,
                format!("job {uuid} not found"),
            )
        })
    }

    async fn cancel_requested(&self, uuid: &str) -> AppResult<bool> {
        Ok(self
            .jobs
            .get_job(uuid)
            .await?
            .is_some_and(|job| job.cancel_requested))
    }

    async fn transition(
        &self,
        ctx: &ExecutionContext,
        stage: &mut JobStatus,
        next: JobStatus,
        message: Option<&str>,
    ) -> AppResult<()> {
        if *stage != next {
            self.jobs
                .update_status(&ctx.job().uuid, next, message)
                .await?;
            tracing::info!(job = %ctx.job().uuid, from = %stage, to = %next, "job status changed");
            *stage = next;
        }
        Ok(())
    }

    async fn finish(&self, job: &Job, status: JobStatus, message: &str) -> AppResult<()> {
        self.jobs.update_status(&job.uuid, status, Some(message)).await?;
        let event = match status {
            JobStatus::Done => "job.done",
            JobStatus::Cancelled => "job.cancelled",
            _ => "job.failed",
        };
        self.emit(event, job, status, Some(message.to_string()));
        tracing::info!(job = %job.uuid, %status, "{message}");
        Ok(())
    }

    async fn fail(&self, job: &Job, err: &AppError) -> AppResult<JobStatus> {
        tracing::warn!(job = %job.uuid, code = err.code(), "job failed: {err}");
        self.finish(job, JobStatus::Failed, &err.to_string()).await?;
        Ok(JobStatus::Failed)
    }

    fn emit(&self, name: &'static str, job: &Job, status: JobStatus, detail: Option<String>) {
        self.telemetry.event(
            name,
            TelemetryEvent {
                tenant: Some(job.tenant.clone()),
                job_uuid: Some(job.uuid.clone()),
                system: Some(job.exec_system_id.clone()),
                remote_job_id: job.remote_job_id.clone(),
                status: Some(status.to_string()),
                detail,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::adapters::db::{JobStore, SqliteStoreAdapter};
    use crate::app::errors::unavailable;
    use crate::app::ports::NoopTelemetry;
    use crate::app::services::launcher::ThrottleSettings;
    use crate::app::testing::{PausedClock, Reply, ScriptedRemote, exit, new_job, new_system, ok};
    use crate::app::types::{
        JobType, NewSystem, RecoverConditionCode, RecoverTesterType, Runtime,
    };

    #[derive(Default)]
    struct CapturingQueue {
        sent: Mutex<Vec<RecoverMsg>>,
    }

    #[async_trait]
    impl RecoveryQueuePort for CapturingQueue {
        async fn send(&self, msg: RecoverMsg) -> AppResult<()> {
            self.sent.lock().unwrap().push(msg);
            Ok(())
        }
    }

    struct Harness {
        engine: JobEngine,
        store: Arc<SqliteStoreAdapter>,
        remote: Arc<ScriptedRemote>,
        queue: Arc<CapturingQueue>,
    }

    impl Harness {
        async fn new(system: NewSystem) -> Self {
            let store = Arc::new(SqliteStoreAdapter::new(
                JobStore::open_memory().await.expect("open store"),
            ));
            store.upsert_system(&system).await.expect("insert system");
            let remote = Arc::new(ScriptedRemote::default());
            let queue = Arc::new(CapturingQueue::default());
            let engine = JobEngine::new(
                store.clone(),
                store.clone(),
                remote.clone(),
                queue.clone(),
                Arc::new(PausedClock::new()),
                Arc::new(NoopTelemetry),
                Arc::new(LaunchThrottle::new(ThrottleSettings::default())),
                Arc::new(RuntimeRegistry::standard()),
                EngineSettings {
                    sender_id: "jobsd-test".to_string(),
                    ..EngineSettings::default()
                },
            );
            Self {
                engine,
                store,
                remote,
                queue,
            }
        }

        async fn add_job(&self, uuid: &str, job_type: JobType, runtime: Runtime) {
            self.store
                .insert_job(&new_job(uuid, job_type, runtime))
                .await
                .expect("insert job");
        }

        async fn job(&self, uuid: &str) -> Job {
            self.store
                .get_job(uuid)
                .await
                .expect("get job")
                .expect("job exists")
        }

        fn recover_msgs(&self) -> Vec<JobRecoverMsg> {
            self.queue
                .sent
                .lock()
                .unwrap()
                .iter()
                .filter_map(|msg| match msg {
                    RecoverMsg::Recover(m) => Some(m.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fork_docker_job_runs_to_completion() {
        let h = Harness::new(new_system("hpc1")).await;
        h.add_job("j1", JobType::Fork, Runtime::Docker).await;
        h.remote.on("nohup setsid", ok("4242\n"));
        h.remote.on("ps -p", ok("RUNNING\n"));
        h.remote.on("ps -p", ok("0\n"));

        let status = h.engine.process_job("j1").await.expect("process");
        assert_eq!(status, JobStatus::Done);

        let job = h.job("j1").await;
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.remote_job_id.as_deref(), Some("4242"));
        assert_eq!(job.remote_checks_success, 2);
        assert_eq!(job.last_message.as_deref(), Some("job completed"));
        let script = h.remote.installed_file("jobrun.sh").expect("script installed");
        assert!(script.contains("docker run"));
        assert!(h.remote.installed_file("jobrun.env").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn batch_job_moves_from_queued_to_running_to_done() {
        let h = Harness::new(new_system("hpc1")).await;
        h.add_job("j1", JobType::Batch, Runtime::Docker).await;
        h.remote.on("sbatch", ok("Submitted batch job 482193\n"));
        h.remote.on("squeue", ok("PENDING\n"));
        h.remote.on("squeue", ok("RUNNING\n"));
        h.remote.on(
            "squeue",
            exit(1, "", "slurm_load_jobs error: Invalid job id specified"),
        );
        h.remote.on("sacct", ok("COMPLETED|\nCOMPLETED|\n"));

        let status = h.engine.process_job("j1").await.expect("process");
        assert_eq!(status, JobStatus::Done);
        let job = h.job("j1").await;
        assert_eq!(job.remote_job_id.as_deref(), Some("482193"));
        assert_eq!(job.remote_checks_success, 3);
        let script = h.remote.installed_file("jobrun.sh").expect("script installed");
        assert!(script.contains("#SBATCH --time=00:10:00"));
    }

    #[tokio::test]
    async fn invalid_container_option_fails_without_installing() {
        let h = Harness::new(new_system("hpc1")).await;
        let mut job = new_job("j1", JobType::Fork, Runtime::Docker);
        job.parameters.container_args = vec!["--cidfile=/tmp/x".into()];
        h.store.insert_job(&job).await.expect("insert job");

        let status = h.engine.process_job("j1").await.expect("process");
        assert_eq!(status, JobStatus::Failed);
        let job = h.job("j1").await;
        assert!(job.last_message.unwrap_or_default().contains("--cidfile"));
        assert!(h.remote.installed.lock().unwrap().is_empty());
        assert!(h.remote.commands().is_empty());
    }

    #[tokio::test]
    async fn connection_failure_during_launch_blocks_job() {
        let h = Harness::new(new_system("hpc1")).await;
        h.add_job("j1", JobType::Batch, Runtime::Docker).await;
        h.remote.on(
            "sbatch",
            Reply::Error(unavailable(codes::CONNECTION_FAILURE, "connection refused")),
        );

        let status = h.engine.process_job("j1").await.expect("process");
        assert_eq!(status, JobStatus::Blocked);
        assert_eq!(h.job("j1").await.status, JobStatus::Blocked);
        let msgs = h.recover_msgs();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].condition_code, RecoverConditionCode::ConnectionFailure);
        assert_eq!(msgs[0].tester_type, RecoverTesterType::DefaultConnectionTester);
        assert_eq!(msgs[0].success_status, JobStatus::SubmittingJob);
        assert_eq!(msgs[0].header.sender_id, "jobsd-test");
    }

    #[tokio::test]
    async fn authentication_failure_while_staging_is_first_contact() {
        let h = Harness::new(new_system("hpc1")).await;
        h.add_job("j1", JobType::Fork, Runtime::Docker).await;
        let remote = Arc::new(FailingInstall);
        let engine = JobEngine {
            remote_exec: remote,
            ..h.engine.clone()
        };

        let status = engine.process_job("j1").await.expect("process");
        assert_eq!(status, JobStatus::Blocked);
        let msgs = h.recover_msgs();
        assert_eq!(
            msgs[0].condition_code,
            RecoverConditionCode::FirstAuthenticationFailure
        );
        assert_eq!(msgs[0].success_status, JobStatus::StagingJob);
    }

    struct FailingInstall;

    #[async_trait]
    impl RemoteExecPort for FailingInstall {
        async fn exec_capture(
            &self,
            _config: &crate::app::types::SshConfig,
            _command: &str,
        ) -> AppResult<crate::app::ports::ExecCapture> {
            Err(unavailable(codes::AUTHENTICATION_FAILURE, "publickey denied"))
        }

        async fn install_file(
            &self,
            _config: &crate::app::types::SshConfig,
            _remote_path: &str,
            _content: &[u8],
            _mode: u32,
        ) -> AppResult<()> {
            Err(unavailable(codes::AUTHENTICATION_FAILURE, "publickey denied"))
        }

        async fn needs_connect(&self, _config: &crate::app::types::SshConfig) -> AppResult<bool> {
            Ok(true)
        }

        async fn remove_session(&self, _session_name: &str) -> AppResult<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn quota_and_disabled_system_block_before_launch() {
        let mut system = new_system("hpc1");
        system.max_jobs_per_user = Some(1);
        let h = Harness::new(system.clone()).await;
        h.add_job("busy", JobType::Batch, Runtime::Docker).await;
        h.store
            .update_status("busy", JobStatus::Running, None)
            .await
            .expect("update");
        h.add_job("j1", JobType::Batch, Runtime::Docker).await;

        assert_eq!(
            h.engine.process_job("j1").await.expect("process"),
            JobStatus::Blocked
        );
        let msgs = h.recover_msgs();
        assert_eq!(msgs[0].condition_code, RecoverConditionCode::QuotaExceeded);
        assert_eq!(msgs[0].tester_params.get("owner").map(String::as_str), Some("alice"));
        assert!(!h.remote.commands().iter().any(|c| c.contains("sbatch")));

        system.enabled = false;
        h.store.upsert_system(&system).await.expect("disable");
        h.add_job("j2", JobType::Batch, Runtime::Docker).await;
        assert_eq!(
            h.engine.process_job("j2").await.expect("process"),
            JobStatus::Blocked
        );
        assert_eq!(
            h.recover_msgs()[1].condition_code,
            RecoverConditionCode::SystemNotAvailable
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_request_stops_monitoring_and_kills_remote_job() {
        let h = Harness::new(new_system("hpc1")).await;
        h.add_job("j1", JobType::Fork, Runtime::Docker).await;
        h.store
            .update_status("j1", JobStatus::Running, None)
            .await
            .expect("update");
        h.store.set_remote_job_id("j1", "4242").await.expect("remote id");

        assert!(h.engine.cancel_job("j1").await.expect("cancel"));
        let status = h.engine.process_job("j1").await.expect("process");
        assert_eq!(status, JobStatus::Cancelled);
        assert!(h.remote.commands().iter().any(|c| c.contains("kill -TERM")));
        assert!(!h.engine.cancel_job("j1").await.expect("cancel again"));
    }

    #[tokio::test]
    async fn cancelling_blocked_job_goes_through_recovery_queue() {
        let h = Harness::new(new_system("hpc1")).await;
        h.add_job("j1", JobType::Fork, Runtime::Docker).await;
        h.store
            .update_status("j1", JobStatus::Blocked, None)
            .await
            .expect("update");

        assert!(h.engine.cancel_job("j1").await.expect("cancel"));
        let sent = h.queue.sent.lock().unwrap().clone();
        assert!(matches!(
            &sent[..],
            [RecoverMsg::CancelRecover(msg)]
                if msg.job_uuid == "j1" && msg.new_status == JobStatus::Cancelled
        ));
        assert_eq!(h.job("j1").await.status, JobStatus::Blocked);
    }

    #[tokio::test(start_paused = true)]
    async fn running_job_past_its_budget_times_out() {
        let h = Harness::new(new_system("hpc1")).await;
        let mut job = new_job("j1", JobType::Fork, Runtime::Docker);
        job.max_minutes = 1;
        h.store.insert_job(&job).await.expect("insert job");
        h.remote.on("nohup setsid", ok("4242\n"));
        h.remote.on("ps -p", ok("RUNNING\n"));

        let status = h.engine.process_job("j1").await.expect("process");
        assert_eq!(status, JobStatus::Failed);
        let message = h.job("j1").await.last_message.unwrap_or_default();
        assert!(message.contains("TIME_EXPIRED"), "{message}");
        assert!(h.remote.commands().iter().any(|c| c.contains("kill -TERM")));
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_spawns_actionable_jobs_only() {
        let h = Harness::new(new_system("hpc1")).await;
        h.add_job("a", JobType::Fork, Runtime::Docker).await;
        h.add_job("b", JobType::Fork, Runtime::Docker).await;
        h.add_job("c", JobType::Fork, Runtime::Docker).await;
        h.store
            .update_status("c", JobStatus::Blocked, None)
            .await
            .expect("update");

        assert_eq!(h.engine.dispatch_actionable().await.expect("dispatch"), 2);
        for uuid in ["a", "b"] {
            let mut status = h.job(uuid).await.status;
            for _ in 0..100 {
                if status.is_terminal() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
                status = h.job(uuid).await.status;
            }
            // The scripted remote answers the launch with empty output.
            assert_eq!(status, JobStatus::Failed, "{uuid}");
        }
        assert_eq!(h.job("c").await.status, JobStatus::Blocked);
    }

    struct ClosedQueue;

    #[async_trait]
    impl RecoveryQueuePort for ClosedQueue {
        async fn send(&self, _msg: RecoverMsg) -> AppResult<()> {
            Err(internal_error("recovery queue closed"))
        }
    }

    #[tokio::test]
    async fn closed_recovery_queue_leaves_job_blocked() {
        let h = Harness::new(new_system("hpc1")).await;
        h.add_job("j1", JobType::Batch, Runtime::Docker).await;
        h.remote.on(
            "sbatch",
            Reply::Error(unavailable(codes::CONNECTION_FAILURE, "connection refused")),
        );
        let engine = JobEngine {
            recovery_queue: Arc::new(ClosedQueue),
            ..h.engine.clone()
        };

        let status = engine.process_job("j1").await.expect("process");
        assert_eq!(status, JobStatus::Blocked);
        let job = h.job("j1").await;
        assert_eq!(job.status, JobStatus::Blocked);
        assert!(job.last_message.unwrap_or_default().contains("CONNECTION_FAILURE"));
    }

    /// Flags the job for cancellation while its status query fails on the connection.
    struct CancelDuringQuery {
        store: Arc<SqliteStoreAdapter>,
        commands: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RemoteExecPort for CancelDuringQuery {
        async fn exec_capture(
            &self,
            _config: &crate::app::types::SshConfig,
            command: &str,
        ) -> AppResult<crate::app::ports::ExecCapture> {
            self.commands.lock().unwrap().push(command.to_string());
            if command.contains("ps -p") {
                self.store.request_cancel("j1").await?;
                return Err(unavailable(codes::CONNECTION_FAILURE, "connection reset"));
            }
            Ok(crate::app::ports::ExecCapture::default())
        }

        async fn install_file(
            &self,
            _config: &crate::app::types::SshConfig,
            _remote_path: &str,
            _content: &[u8],
            _mode: u32,
        ) -> AppResult<()> {
            Ok(())
        }

        async fn needs_connect(&self, _config: &crate::app::types::SshConfig) -> AppResult<bool> {
            Ok(false)
        }

        async fn remove_session(&self, _session_name: &str) -> AppResult<bool> {
            Ok(false)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_requested_before_transient_failure_is_not_blocked() {
        let h = Harness::new(new_system("hpc1")).await;
        h.add_job("j1", JobType::Fork, Runtime::Docker).await;
        h.store
            .update_status("j1", JobStatus::Running, None)
            .await
            .expect("update");
        h.store.set_remote_job_id("j1", "4242").await.expect("remote id");
        let remote = Arc::new(CancelDuringQuery {
            store: h.store.clone(),
            commands: Mutex::new(Vec::new()),
        });
        let engine = JobEngine {
            remote_exec: remote.clone(),
            ..h.engine.clone()
        };

        let status = engine.process_job("j1").await.expect("process");
        assert_eq!(status, JobStatus::Cancelled);
        assert_eq!(h.job("j1").await.status, JobStatus::Cancelled);
        assert!(h.recover_msgs().is_empty());
        let commands = remote.commands.lock().unwrap().clone();
        assert!(commands.iter().any(|c| c.contains("kill -TERM")), "{commands:?}");
    }
}
