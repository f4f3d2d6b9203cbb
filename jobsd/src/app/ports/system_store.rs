// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::{ExecSystem, NewSystem};

#[async_trait]
pub trait SystemStorePort: Send + Sync {
    async fn upsert_system(&self, system: &NewSystem) -> AppResult<()>;
    async fn get_system(&self, tenant: &str, id: &str) -> AppResult<Option<ExecSystem>>;
}
