// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::SshConfig;

#[derive(Debug, Clone, Default)]
pub struct ExecCapture {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl ExecCapture {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

#[async_trait]
/// Remote command execution and SSH session lifecycle boundary.
/// Used identically by staging (file install) and launching.
pub trait RemoteExecPort: Send + Sync {
    async fn exec_capture(&self, config: &SshConfig, command: &str) -> AppResult<ExecCapture>;

    /// Write `content` to `remote_path` with the given unix permission bits.
    async fn install_file(
        &self,
        config: &SshConfig,
        remote_path: &str,
        content: &[u8],
        mode: u32,
    ) -> AppResult<()>;

    async fn needs_connect(&self, config: &SshConfig) -> AppResult<bool>;

    async fn remove_session(&self, session_name: &str) -> AppResult<bool>;
}
