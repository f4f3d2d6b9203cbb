// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Per-host launch throttling.
//!
//! One table per process maps a host to the launch timestamps inside the
//! current window. A launch that does not fit sleeps a skewed random delay
//! before it proceeds, which spreads out SSH connection bursts against a host.

use std::collections::VecDeque;
use std::time::Duration;

use dashmap::DashMap;
use serde::Deserialize;
use tokio::time::Instant;

use crate::app::services::random;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ThrottleSettings {
    pub window_millis: u64,
    pub max_launches: usize,
    pub min_delay_millis: u64,
    pub max_skew_millis: u64,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            window_millis: 5_000,
            max_launches: 6,
            min_delay_millis: 5_000,
            max_skew_millis: 15_000,
        }
    }
}

pub struct LaunchThrottle {
    settings: ThrottleSettings,
    windows: DashMap<String, VecDeque<Instant>>,
}

impl LaunchThrottle {
    pub fn new(settings: ThrottleSettings) -> Self {
        Self {
            settings,
            windows: DashMap::new(),
        }
    }

    /// Record a launch slot for `host`; `false` when the window is already full.
    pub fn record(&self, host: &str) -> bool {
        let now = Instant::now();
        let window = Duration::from_millis(self.settings.window_millis);
        let mut slots = self.windows.entry(host.to_string()).or_default();
        while slots
            .front()
            .is_some_and(|first| now.duration_since(*first) >= window)
        {
            slots.pop_front();
        }
        if slots.len() >= self.settings.max_launches {
            return false;
        }
        slots.push_back(now);
        true
    }

    /// Wait for permission to launch against `host` and return how long we slept.
    /// An unknown host skips throttling.
    pub async fn acquire(&self, host: Option<&str>) -> Duration {
        let Some(host) = host else {
            tracing::warn!("launch target host unknown; skipping throttle");
            return Duration::ZERO;
        };
        if self.record(host) {
            return Duration::ZERO;
        }
        let delay = random::skewed_delay(
            Duration::from_millis(self.settings.min_delay_millis),
            Duration::from_millis(self.settings.max_skew_millis),
        );
        tracing::debug!(host, "launch window full; sleeping {delay:?}");
        tokio::time::sleep(delay).await;
        delay
    }
}
