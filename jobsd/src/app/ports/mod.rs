// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod clock;
pub mod job_store;
pub mod recovery_queue;
pub mod recovery_store;
pub mod remote_exec;
pub mod system_store;
pub mod telemetry;

pub use clock::ClockPort;
pub use job_store::JobStorePort;
pub use recovery_queue::RecoveryQueuePort;
pub use recovery_store::{BlockOutcome, RecoveryStorePort};
pub use remote_exec::{ExecCapture, RemoteExecPort};
pub use system_store::SystemStorePort;
pub use telemetry::{NoopTelemetry, TelemetryEvent, TelemetryPort};
