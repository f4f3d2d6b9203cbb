// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;

use crate::app::errors::AppResult;
use crate::app::ports::{ExecCapture, RemoteExecPort};
use crate::app::services::shell;
use crate::app::types::{AppSpec, ExecSystem, Job, SshConfig};

/// A job bound to its execution system and a command channel for one processing attempt.
pub struct ExecutionContext {
    job: Job,
    system: ExecSystem,
    ssh: SshConfig,
    remote: Arc<dyn RemoteExecPort>,
}

impl ExecutionContext {
    pub fn new(job: Job, system: ExecSystem, remote: Arc<dyn RemoteExecPort>) -> Self {
        let ssh = SshConfig::for_system(&system);
        Self {
            job,
            system,
            ssh,
            remote,
        }
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn system(&self) -> &ExecSystem {
        &self.system
    }

    pub fn app(&self) -> &AppSpec {
        &self.job.app
    }

    pub fn ssh_config(&self) -> &SshConfig {
        &self.ssh
    }

    /// Host used for launch throttling; `None` when the system has no usable host.
    pub fn host(&self) -> Option<&str> {
        let host = self.system.host.trim();
        (!host.is_empty()).then_some(host)
    }

    pub fn exec_path(&self, name: &str) -> String {
        shell::join_path(&self.job.exec_dir, name)
    }

    pub async fn execute(&self, command: &str) -> AppResult<ExecCapture> {
        tracing::debug!(
            job = %self.job.uuid,
            host = %self.system.host,
            "remote command: {command}"
        );
        self.remote.exec_capture(&self.ssh, command).await
    }

    /// Write `content` as `name` under the job's execution directory and return its path.
    pub async fn install_exec_file(
        &self,
        content: &str,
        name: &str,
        mode: u32,
    ) -> AppResult<String> {
        let path = self.exec_path(name);
        self.remote
            .install_file(&self.ssh, &path, content.as_bytes(), mode)
            .await?;
        Ok(path)
    }
}
