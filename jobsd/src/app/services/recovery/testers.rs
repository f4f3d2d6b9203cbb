// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Predicates polled to decide whether a blocking condition has cleared.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::app::errors::{AppResult, invalid_argument};
use crate::app::ports::{JobStorePort, RemoteExecPort, SystemStorePort};
use crate::app::types::{ExecSystem, JobRecovery, RecoverTesterType, SshConfig};

#[async_trait]
pub trait RecoverTester: Send + Sync {
    /// True once the blocked jobs may resume.
    async fn can_unblock(&self) -> AppResult<bool>;
}

/// Collaborators testers may consult.
#[derive(Clone)]
pub struct TesterDeps {
    pub systems: Arc<dyn SystemStorePort>,
    pub jobs: Arc<dyn JobStorePort>,
    pub remote_exec: Arc<dyn RemoteExecPort>,
}

fn required<'a>(params: &'a BTreeMap<String, String>, key: &str) -> AppResult<&'a str> {
    params
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| invalid_argument(format!("tester parameter '{key}' is missing")))
}

async fn load_system(
    deps: &TesterDeps,
    tenant: &str,
    system_id: &str,
) -> AppResult<Option<ExecSystem>> {
    let system = deps.systems.get_system(tenant, system_id).await?;
    if system.is_none() {
        tracing::debug!(tenant, system_id, "tester found no system record");
    }
    Ok(system)
}

pub struct SystemAvailableTester {
    deps: TesterDeps,
    tenant: String,
    system_id: String,
}

#[async_trait]
impl RecoverTester for SystemAvailableTester {
    async fn can_unblock(&self) -> AppResult<bool> {
        Ok(load_system(&self.deps, &self.tenant, &self.system_id)
            .await?
            .is_some_and(|system| system.enabled))
    }
}

/// Runs `true` on the host; used for connection and authentication conditions.
pub struct RemoteCommandTester {
    deps: TesterDeps,
    tenant: String,
    system_id: String,
}

#[async_trait]
impl RecoverTester for RemoteCommandTester {
    async fn can_unblock(&self) -> AppResult<bool> {
        let Some(system) = load_system(&self.deps, &self.tenant, &self.system_id).await? else {
            return Ok(false);
        };
        let config = SshConfig::for_system(&system);
        match self.deps.remote_exec.exec_capture(&config, "true").await {
            Ok(capture) => Ok(capture.exit_code == 0),
            Err(err) if err.is_transient() => {
                tracing::debug!(system = %system.id, "remote test still failing: {err}");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }
}

pub struct QuotaTester {
    deps: TesterDeps,
    tenant: String,
    system_id: String,
    owner: String,
}

#[async_trait]
impl RecoverTester for QuotaTester {
    async fn can_unblock(&self) -> AppResult<bool> {
        let Some(system) = load_system(&self.deps, &self.tenant, &self.system_id).await? else {
            return Ok(false);
        };
        let Some(limit) = system.max_jobs_per_user.filter(|limit| *limit > 0) else {
            return Ok(true);
        };
        let active = self
            .deps
            .jobs
            .count_active_jobs(&self.tenant, &self.system_id, &self.owner)
            .await?;
        Ok(active < limit)
    }
}

pub fn tester_for(recovery: &JobRecovery, deps: &TesterDeps) -> AppResult<Box<dyn RecoverTester>> {
    let params = &recovery.tester_params;
    let tenant = required(params, "tenant")?.to_string();
    let system_id = required(params, "systemId")?.to_string();
    let deps = deps.clone();
    Ok(match recovery.tester_type {
        RecoverTesterType::DefaultSystemAvailableTester => Box::new(SystemAvailableTester {
            deps,
            tenant,
            system_id,
        }),
        RecoverTesterType::DefaultConnectionTester
        | RecoverTesterType::DefaultAuthenticationTester => Box::new(RemoteCommandTester {
            deps,
            tenant,
            system_id,
        }),
        RecoverTesterType::DefaultQuotaTester => Box::new(QuotaTester {
            owner: required(params, "owner")?.to_string(),
            deps,
            tenant,
            system_id,
        }),
    })
}
