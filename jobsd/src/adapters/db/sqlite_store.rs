// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;

use async_trait::async_trait;

use crate::adapters::db::{JobStore, JobStoreError};
use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{BlockOutcome, JobStorePort, RecoveryStorePort, SystemStorePort};
use crate::app::types::{
    ExecSystem, Job, JobBlocked, JobRecovery, JobStatus, NewJob, NewJobBlocked, NewJobRecovery,
    NewSystem,
};

#[derive(Clone)]
pub struct SqliteStoreAdapter {
    store: Arc<JobStore>,
}

impl SqliteStoreAdapter {
    pub fn new(store: JobStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }
}

/// Persistence errors stop here; the app core only sees AppError.
fn map_store_error(err: JobStoreError) -> AppError {
    match err {
        JobStoreError::Empty(what) => AppError::with_message(
            AppErrorKind::InvalidArgument,
            codes::INVALID_ARGUMENT,
            format!("empty {what}"),
        ),
        JobStoreError::JobNotFound(uuid) => AppError::with_message(
            AppErrorKind::NotFound,
            codes::NOT_FOUND,
            format!("job {uuid} not found"),
        ),
        JobStoreError::RecoveryNotFound(id) => AppError::with_message(
            AppErrorKind::NotFound,
            codes::NOT_FOUND,
            format!("recovery record {id} not found"),
        ),
        other @ (JobStoreError::Sqlx(_)
        | JobStoreError::Serde(_)
        | JobStoreError::Corrupt { .. }) => {
            tracing::error!("store failure: {other}");
            AppError::with_message(AppErrorKind::Internal, codes::INTERNAL_ERROR, other.to_string())
        }
    }
}

#[async_trait]
impl SystemStorePort for SqliteStoreAdapter {
    async fn upsert_system(&self, system: &NewSystem) -> AppResult<()> {
        self.store
            .upsert_system(system)
            .await
            .map_err(map_store_error)
    }

    async fn get_system(&self, tenant: &str, id: &str) -> AppResult<Option<ExecSystem>> {
        self.store
            .get_system(tenant, id)
            .await
            .map_err(map_store_error)
    }
}

#[async_trait]
impl JobStorePort for SqliteStoreAdapter {
    async fn insert_job(&self, job: &NewJob) -> AppResult<i64> {
        self.store.insert_job(job).await.map_err(map_store_error)
    }

    async fn get_job(&self, uuid: &str) -> AppResult<Option<Job>> {
        self.store.get_job(uuid).await.map_err(map_store_error)
    }

    async fn list_jobs_by_status(&self, statuses: &[JobStatus]) -> AppResult<Vec<Job>> {
        self.store
            .list_jobs_by_status(statuses)
            .await
            .map_err(map_store_error)
    }

    async fn set_remote_job_id(&self, uuid: &str, remote_job_id: &str) -> AppResult<()> {
        self.store
            .set_remote_job_id(uuid, remote_job_id)
            .await
            .map_err(map_store_error)
    }

    async fn update_status(
        &self,
        uuid: &str,
        status: JobStatus,
        message: Option<&str>,
    ) -> AppResult<()> {
        self.store
            .update_status(uuid, status, message)
            .await
            .map_err(map_store_error)
    }

    async fn record_remote_check(&self, uuid: &str, success: bool) -> AppResult<()> {
        self.store
            .record_remote_check(uuid, success)
            .await
            .map_err(map_store_error)
    }

    async fn request_cancel(&self, uuid: &str) -> AppResult<bool> {
        self.store
            .request_cancel(uuid)
            .await
            .map_err(map_store_error)
    }

    async fn count_active_jobs(
        &self,
        tenant: &str,
        system_id: &str,
        owner: &str,
    ) -> AppResult<i64> {
        self.store
            .count_active_jobs(tenant, system_id, owner)
            .await
            .map_err(map_store_error)
    }
}

#[async_trait]
impl RecoveryStorePort for SqliteStoreAdapter {
    async fn block_job(
        &self,
        recovery: &NewJobRecovery,
        blocked: &NewJobBlocked,
    ) -> AppResult<BlockOutcome> {
        let (recovery_id, created) = self
            .store
            .block_job(recovery, blocked)
            .await
            .map_err(map_store_error)?;
        Ok(BlockOutcome {
            recovery_id,
            created,
        })
    }

    async fn get_recovery(&self, id: i64) -> AppResult<Option<JobRecovery>> {
        self.store.get_recovery(id).await.map_err(map_store_error)
    }

    async fn list_recoveries(&self) -> AppResult<Vec<JobRecovery>> {
        self.store.list_recoveries().await.map_err(map_store_error)
    }

    async fn increment_recovery_attempts(&self, id: i64) -> AppResult<i64> {
        self.store
            .increment_recovery_attempts(id)
            .await
            .map_err(map_store_error)
    }

    async fn unblock_job(&self, job_uuid: &str) -> AppResult<Option<JobBlocked>> {
        self.store
            .unblock_job(job_uuid)
            .await
            .map_err(map_store_error)
    }

    async fn resolve_recovery(&self, id: i64) -> AppResult<Vec<JobBlocked>> {
        self.store
            .resolve_recovery(id)
            .await
            .map_err(map_store_error)
    }
}
