// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::{JobBlocked, JobRecovery, NewJobBlocked, NewJobRecovery};

/// Result of parking a job under a recovery record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOutcome {
    pub recovery_id: i64,
    /// False when the job attached to an existing record with the same tester hash.
    pub created: bool,
}

#[async_trait]
/// Persistence for recovery records and the jobs blocked on them.
/// Attach, detach and resolve are each atomic with respect to one another.
pub trait RecoveryStorePort: Send + Sync {
    async fn block_job(
        &self,
        recovery: &NewJobRecovery,
        blocked: &NewJobBlocked,
    ) -> AppResult<BlockOutcome>;
    async fn get_recovery(&self, id: i64) -> AppResult<Option<JobRecovery>>;
    async fn list_recoveries(&self) -> AppResult<Vec<JobRecovery>>;
    async fn increment_recovery_attempts(&self, id: i64) -> AppResult<i64>;
    /// Detach a single job; drops the record when no blocked jobs remain.
    async fn unblock_job(&self, job_uuid: &str) -> AppResult<Option<JobBlocked>>;
    /// Delete the record and hand back every job that was attached to it.
    async fn resolve_recovery(&self, id: i64) -> AppResult<Vec<JobBlocked>>;
}
