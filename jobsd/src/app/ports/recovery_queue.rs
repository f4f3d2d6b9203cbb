// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::services::recovery::RecoverMsg;

#[async_trait]
/// Asynchronous channel carrying recovery messages to the recovery processor.
pub trait RecoveryQueuePort: Send + Sync {
    async fn send(&self, msg: RecoverMsg) -> AppResult<()>;
}
