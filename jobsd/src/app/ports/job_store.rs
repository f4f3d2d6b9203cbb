// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::{Job, JobStatus, NewJob};

#[async_trait]
pub trait JobStorePort: Send + Sync {
    async fn insert_job(&self, job: &NewJob) -> AppResult<i64>;
    async fn get_job(&self, uuid: &str) -> AppResult<Option<Job>>;
    async fn list_jobs_by_status(&self, statuses: &[JobStatus]) -> AppResult<Vec<Job>>;
    async fn set_remote_job_id(&self, uuid: &str, remote_job_id: &str) -> AppResult<()>;
    async fn update_status(
        &self,
        uuid: &str,
        status: JobStatus,
        message: Option<&str>,
    ) -> AppResult<()>;
    /// Bump the success or failure counter of remote status checks.
    async fn record_remote_check(&self, uuid: &str, success: bool) -> AppResult<()>;
    async fn request_cancel(&self, uuid: &str) -> AppResult<bool>;
    async fn count_active_jobs(&self, tenant: &str, system_id: &str, owner: &str)
    -> AppResult<i64>;
}
