// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::anyhow;
use russh::client::Config;
use russh::keys::known_hosts::learn_known_hosts;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

mod auth;
mod exec;
mod sftp;

/// Minimal russh client handler; server keys are checked against known_hosts.
#[derive(Clone, Debug)]
struct ClientHandler {
    host: String,
    port: u16,
}

impl russh::client::Handler for ClientHandler {
    type Error = anyhow::Error;
    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        verify_server_key(&self.host, self.port, server_public_key)
    }
}

/// Parameters for establishing the SSH connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SshParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Explicit private key; `None` falls back to the user's default keys.
    pub identity_path: Option<String>,
    pub keepalive_secs: u64,
}

/// Known keys must match; unknown hosts are learned on first contact.
fn verify_server_key(
    host: &str,
    port: u16,
    key: &russh::keys::ssh_key::PublicKey,
) -> std::result::Result<bool, anyhow::Error> {
    match russh::keys::check_known_hosts(host, port, key) {
        Ok(true) => return Ok(true),
        Ok(false) => {}
        Err(err) => {
            tracing::warn!("server key validation failed for {host}:{port}: {err}");
            return Err(anyhow!(
                "server key validation failed for {host}:{port}: {err}"
            ));
        }
    }
    tracing::info!("server key for {host}:{port} is not present in known_hosts; learning");
    learn_known_hosts(host, port, key).map_err(|err| {
        tracing::warn!("failed to learn server key for {host}:{port}: {err}");
        anyhow!("failed to learn server key for {host}:{port}: {err}")
    })?;
    Ok(true)
}

/// Manager that owns a single long-lived SSH connection.
pub struct SessionManager {
    params: SshParams,
    config: Arc<Config>,
    // Commands on one connection are serialized through this lock.
    handle: Arc<Mutex<Option<russh::client::Handle<ClientHandler>>>>,
    keepalive_task_handle: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl SessionManager {
    pub fn new(params: SshParams) -> Self {
        let cfg = Config {
            inactivity_timeout: Some(Duration::from_secs(params.keepalive_secs.max(1) * 4)),
            keepalive_interval: Some(Duration::from_secs(params.keepalive_secs.max(1))),
            ..Default::default()
        };
        Self {
            params,
            config: Arc::new(cfg),
            handle: Arc::new(Mutex::new(None)),
            keepalive_task_handle: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn needs_connect(&self) -> bool {
        let handle_field = self.handle.lock().await;
        match handle_field.as_ref() {
            None => true,
            Some(h) if h.is_closed() => true,
            Some(_) => false,
        }
    }

    pub fn matches_params(&self, params: &SshParams) -> bool {
        self.params == *params
    }

    pub async fn shutdown(&self) {
        if let Some(task) = self.keepalive_task_handle.lock().await.take() {
            task.abort();
        }
        let mut handle_field = self.handle.lock().await;
        if let Some(handle) = handle_field.take() {
            let _ = handle
                .disconnect(russh::Disconnect::ByApplication, "", "en")
                .await;
        }
    }
}
