// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::app::errors::{AppResult, invalid_argument};
use crate::app::types::SshConfig;

use super::{SessionManager, SshParams};

pub trait SessionFactory: Send + Sync {
    fn build(&self, params: SshParams) -> Arc<SessionManager>;
}

#[derive(Default)]
pub struct DefaultSessionFactory;

impl SessionFactory for DefaultSessionFactory {
    fn build(&self, params: SshParams) -> Arc<SessionManager> {
        Arc::new(SessionManager::new(params))
    }
}

/// Connections shared by every job on the same execution system.
pub struct SessionCache {
    sessions: RwLock<HashMap<String, Arc<SessionManager>>>,
    factory: Arc<dyn SessionFactory>,
}

impl SessionCache {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            factory,
        }
    }

    pub async fn get(&self, name: &str) -> Option<Arc<SessionManager>> {
        self.sessions.read().await.get(name).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn remove_and_shutdown(&self, name: &str) -> bool {
        let session = self.sessions.write().await.remove(name);
        if let Some(session) = session {
            session.shutdown().await;
            return true;
        }
        false
    }

    /// Close every cached connection.
    pub async fn shutdown_all(&self) {
        let sessions: Vec<_> = self.sessions.write().await.drain().collect();
        for (name, session) in sessions {
            tracing::debug!("closing ssh session {name}");
            session.shutdown().await;
        }
    }

    /// Reuse the named session unless the system's connection parameters changed.
    pub async fn get_or_create(&self, config: &SshConfig) -> AppResult<Arc<SessionManager>> {
        let params = to_params(config)?;
        let Some(session_name) = config.session_name.as_deref() else {
            return Ok(self.factory.build(params));
        };

        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(session_name) {
            if existing.matches_params(&params) {
                return Ok(existing.clone());
            }
            tracing::info!("connection parameters of {session_name} changed; reconnecting");
        }
        let session = self.factory.build(params);
        if let Some(stale) = sessions.insert(session_name.to_string(), session.clone()) {
            stale.shutdown().await;
        }
        Ok(session)
    }
}

fn to_params(config: &SshConfig) -> AppResult<SshParams> {
    if config.username.trim().is_empty() {
        return Err(invalid_argument("ssh user must not be empty"));
    }
    if config.host.trim().is_empty() {
        return Err(invalid_argument("ssh host must not be empty"));
    }
    Ok(SshParams {
        host: config.host.clone(),
        port: config.port,
        username: config.username.clone(),
        identity_path: config.identity_path.clone(),
        keepalive_secs: config.keepalive_secs,
    })
}
