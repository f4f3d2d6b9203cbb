// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use jobsd::adapters;
use jobsd::app::ports::RecoveryQueuePort;
use jobsd::app::services::launcher::LaunchThrottle;
use jobsd::app::services::recovery::processor::RecoveryDeps;
use jobsd::app::services::recovery::{
    MsgHeader, RecoverMsg, RecoverShutdownMsg, RecoveryProcessor, ShutdownMode,
};
use jobsd::app::services::registry::RuntimeRegistry;
use jobsd::app::usecases::{EngineSettings, JobEngine};
use jobsd::config;
use jobsd::logging;

fn log_config_report(report: &config::ConfigReport) {
    match (&report.config_path, report.config_path_source) {
        (Some(path), Some(source)) => {
            tracing::info!(
                "config path: {} (source={}, present={})",
                path.display(),
                source.as_str(),
                report.config_file_present
            );
        }
        (Some(path), None) => {
            tracing::info!(
                "config path: {} (present={})",
                path.display(),
                report.config_file_present
            );
        }
        (None, _) => {
            tracing::info!("config path: (none)");
        }
    }
    tracing::info!(
        "config database_path: {} (source={})",
        report.database_path.value.display(),
        report.database_path.source.as_str()
    );
    tracing::info!(
        "config poll_interval_secs: {} (source={})",
        report.poll_interval_secs.value,
        report.poll_interval_secs.source.as_str()
    );
    tracing::info!(
        "config verbose: {} (source={})",
        report.verbose.value,
        report.verbose.source.as_str()
    );
    tracing::info!(
        "config sender_id: {} (source={})",
        report.sender_id.value,
        report.sender_id.source.as_str()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = adapters::cli::parse_opts();
    let opts = parsed.opts;
    let config::LoadResult { config, report } = config::load_with_report(
        opts.config,
        config::Overrides {
            database_path: opts.database_path,
            poll_interval_secs: opts.poll_interval_secs,
            verbose: parsed.verbose_override,
        },
    )?;
    logging::init(config.verbose);
    log_config_report(&report);
    config::ensure_database_dir(&config.database_path)?;
    let db = adapters::db::JobStore::open(&config.database_path).await?;

    let store = Arc::new(adapters::db::SqliteStoreAdapter::new(db));
    let ssh = Arc::new(adapters::ssh::SshAdapter::with_defaults());
    let clock = Arc::new(adapters::time::SystemClock::new());
    let telemetry = Arc::new(adapters::telemetry::TracingTelemetry::new());
    let (queue, queue_rx) =
        adapters::queue::ChannelRecoveryQueue::channel(adapters::queue::DEFAULT_CAPACITY);
    let queue = Arc::new(queue);

    let mut processor = RecoveryProcessor::new(RecoveryDeps {
        recoveries: store.clone(),
        jobs: store.clone(),
        systems: store.clone(),
        remote_exec: ssh.clone(),
        clock: clock.clone(),
        telemetry: telemetry.clone(),
    });
    processor.resume_persisted().await?;
    let recovery_task = tokio::spawn(processor.run(queue_rx));

    let engine = JobEngine::new(
        store.clone(),
        store.clone(),
        ssh.clone(),
        queue.clone(),
        clock,
        telemetry,
        Arc::new(LaunchThrottle::new(config.launch_throttle)),
        Arc::new(RuntimeRegistry::standard()),
        EngineSettings {
            sender_id: config.sender_id.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            monitor: config.monitor,
        },
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = engine.clone();
    let worker_task = tokio::spawn(async move { worker.run_worker(shutdown_rx).await });
    tracing::info!(sender_id = %config.sender_id, "jobsd started");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    let _ = shutdown_tx.send(true);
    queue
        .send(RecoverMsg::Shutdown(RecoverShutdownMsg {
            header: MsgHeader::new(&config.sender_id),
            tenant: None,
            mode: ShutdownMode::Graceful,
        }))
        .await?;
    worker_task.await??;
    recovery_task.await??;
    ssh.shutdown().await;
    tracing::info!("jobsd stopped");
    Ok(())
}
