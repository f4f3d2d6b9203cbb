// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::{Context, Result, anyhow};
use russh::client::AuthResult;
use russh::keys::PrivateKeyWithHashAlg;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::ssh::AuthenticationFailure;

use super::{ClientHandler, SessionManager};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Keys tried, in order, when the system names no identity file.
const DEFAULT_KEY_NAMES: [&str; 3] = ["id_ed25519", "id_ecdsa", "id_rsa"];

fn auth_succeeded(result: &AuthResult) -> bool {
    matches!(result, AuthResult::Success)
}

fn identity_candidates(identity_path: Option<&str>) -> Vec<PathBuf> {
    if let Some(path) = identity_path {
        return vec![PathBuf::from(shellexpand::tilde(path).as_ref())];
    }
    let Some(home) = dirs::home_dir() else {
        return Vec::new();
    };
    DEFAULT_KEY_NAMES
        .iter()
        .map(|name| home.join(".ssh").join(name))
        .filter(|path| path.is_file())
        .collect()
}

impl SessionManager {
    /// Ensure we have a connected and authenticated handle.
    pub async fn ensure_connected(&self) -> Result<()> {
        let mut handle_field = self.handle.lock().await;

        // If handle exists but is closed, drop it so we reconnect.
        let needs_connect = match handle_field.as_ref() {
            None => true,
            Some(h) if h.is_closed() => true,
            Some(_) => false,
        };
        if !needs_connect {
            return Ok(());
        }

        tracing::info!(
            "establishing connection with {}@{}:{}",
            &self.params.username,
            &self.params.host,
            self.params.port
        );
        let handler = ClientHandler {
            host: self.params.host.clone(),
            port: self.params.port,
        };
        let connect = russh::client::connect(
            self.config.clone(),
            (self.params.host.as_str(), self.params.port),
            handler,
        );
        let mut handle = tokio::time::timeout(CONNECT_TIMEOUT, connect)
            .await
            .map_err(|_| anyhow!("timed out after {CONNECT_TIMEOUT:?}"))?
            .context("SSH connect failed")?;

        let candidates = identity_candidates(self.params.identity_path.as_deref());
        if candidates.is_empty() {
            return Err(anyhow!(AuthenticationFailure).context("no private key available"));
        }
        let mut authenticated = false;
        for path in &candidates {
            let key = match russh::keys::load_secret_key(path, None) {
                Ok(key) => key,
                Err(err) => {
                    tracing::warn!("failed to load secret key at {}: {err}", path.display());
                    continue;
                }
            };
            // Prefer SHA-256 for RSA if applicable (ignored for non-RSA keys)
            let pk = PrivateKeyWithHashAlg::new(
                Arc::new(key),
                handle.best_supported_rsa_hash().await?.flatten(),
            );
            let result = handle
                .authenticate_publickey(self.params.username.clone(), pk)
                .await?;
            if auth_succeeded(&result) {
                tracing::debug!("authenticated with {}", path.display());
                authenticated = true;
                break;
            }
            tracing::debug!("key {} rejected", path.display());
        }
        if !authenticated {
            return Err(anyhow!(AuthenticationFailure).context(format!(
                "no key accepted for {}@{}",
                self.params.username, self.params.host
            )));
        }

        *handle_field = Some(handle);
        if let Some(interval) = self.config.keepalive_interval {
            let handle_clone = self.handle.clone();
            let jh = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval / 2);
                loop {
                    ticker.tick().await;
                    let guard = handle_clone.lock().await;
                    let Some(handle) = guard.as_ref() else {
                        continue;
                    };
                    if handle.is_closed() {
                        tracing::debug!("keepalive handle is closed");
                        break;
                    }
                    if let Err(e) = handle.send_keepalive(true).await {
                        tracing::debug!("error when sending a keepalive: {e}");
                    }
                }
            });
            if let Some(previous) = self.keepalive_task_handle.lock().await.replace(jh) {
                previous.abort();
            }
        }
        Ok(())
    }
}
