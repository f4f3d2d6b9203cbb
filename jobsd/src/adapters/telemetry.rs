// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::ports::{TelemetryEvent, TelemetryPort};

#[derive(Clone, Default)]
pub struct TracingTelemetry;

impl TracingTelemetry {
    pub fn new() -> Self {
        Self
    }
}

impl TelemetryPort for TracingTelemetry {
    fn event(&self, name: &'static str, fields: TelemetryEvent) {
        let TelemetryEvent {
            tenant,
            job_uuid,
            system,
            remote_job_id,
            status,
            detail,
        } = fields;

        tracing::info!(
            target: "jobsd::telemetry",
            event = name,
            tenant = tenant.as_deref(),
            job = job_uuid.as_deref(),
            system = system.as_deref(),
            remote_job_id = remote_job_id.as_deref(),
            status = status.as_deref(),
            detail = detail.as_deref(),
        );
    }
}
