// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;

use async_trait::async_trait;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{ExecCapture, RemoteExecPort};
use crate::app::types::SshConfig;

mod error;
mod session;

pub mod session_cache;

use session_cache::{DefaultSessionFactory, SessionCache};

pub use error::AuthenticationFailure;
pub use session::{SessionManager, SshParams};

#[derive(Clone)]
pub struct SshAdapter {
    sessions: Arc<SessionCache>,
}

impl SshAdapter {
    pub fn new(sessions: Arc<SessionCache>) -> Self {
        Self { sessions }
    }

    pub fn with_defaults() -> Self {
        let factory = Arc::new(DefaultSessionFactory);
        let sessions = Arc::new(SessionCache::new(factory));
        Self::new(sessions)
    }

    pub async fn shutdown(&self) {
        self.sessions.shutdown_all().await;
    }

    async fn connected(&self, config: &SshConfig) -> AppResult<Arc<SessionManager>> {
        let session = self.sessions.get_or_create(config).await?;
        session
            .ensure_connected()
            .await
            .map_err(|err| map_connect_error(config, err))?;
        Ok(session)
    }
}

fn ssh_error_code(err: &anyhow::Error) -> &'static str {
    if err.chain().any(|cause| cause.is::<AuthenticationFailure>()) {
        codes::AUTHENTICATION_FAILURE
    } else {
        codes::CONNECTION_FAILURE
    }
}

fn map_connect_error(config: &SshConfig, err: anyhow::Error) -> AppError {
    AppError::with_message(
        AppErrorKind::Unavailable,
        ssh_error_code(&err),
        format!(
            "ssh connect to {}@{}:{} failed: {err:#}",
            config.username, config.host, config.port
        ),
    )
}

/// The session was up a moment ago, so a channel failure means the connection dropped.
fn map_exec_error(err: anyhow::Error) -> AppError {
    AppError::with_message(
        AppErrorKind::Unavailable,
        codes::CONNECTION_FAILURE,
        format!("ssh exec failed: {err:#}"),
    )
}

fn map_install_error(remote_path: &str, err: anyhow::Error) -> AppError {
    AppError::with_message(
        AppErrorKind::Internal,
        codes::REMOTE_ERROR,
        format!("installing {remote_path} failed: {err:#}"),
    )
}

#[async_trait]
impl RemoteExecPort for SshAdapter {
    #[tracing::instrument(
        name = "ssh",
        level = "debug",
        skip(self, config, command),
        fields(
            op = "exec_capture",
            host = %config.host,
            user = %config.username,
            port = config.port
        )
    )]
    async fn exec_capture(&self, config: &SshConfig, command: &str) -> AppResult<ExecCapture> {
        let session = self.connected(config).await?;
        let (stdout, stderr, exit_code) = session
            .exec_capture(command)
            .await
            .map_err(map_exec_error)?;
        Ok(ExecCapture {
            stdout,
            stderr,
            exit_code,
        })
    }

    #[tracing::instrument(
        name = "sftp",
        level = "debug",
        skip(self, config, content),
        fields(
            op = "install_file",
            host = %config.host,
            user = %config.username,
            path = %remote_path,
            mode = mode
        )
    )]
    async fn install_file(
        &self,
        config: &SshConfig,
        remote_path: &str,
        content: &[u8],
        mode: u32,
    ) -> AppResult<()> {
        let session = self.connected(config).await?;
        match session.install_file(remote_path, content, mode).await {
            Ok(()) => Ok(()),
            Err(err) if session.needs_connect().await => Err(map_exec_error(err)),
            Err(err) => Err(map_install_error(remote_path, err)),
        }
    }

    #[tracing::instrument(
        name = "ssh",
        level = "debug",
        skip(self, config),
        fields(
            op = "needs_connect",
            host = %config.host,
            user = %config.username,
            port = config.port
        )
    )]
    async fn needs_connect(&self, config: &SshConfig) -> AppResult<bool> {
        let session = self.sessions.get_or_create(config).await?;
        Ok(session.needs_connect().await)
    }

    #[tracing::instrument(
        name = "ssh",
        level = "debug",
        skip(self),
        fields(op = "remove_session", session = %session_name)
    )]
    async fn remove_session(&self, session_name: &str) -> AppResult<bool> {
        Ok(self.sessions.remove_and_shutdown(session_name).await)
    }
}
