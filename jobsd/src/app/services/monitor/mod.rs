// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod parameters;
pub mod remote_status;
pub mod stepwise;

pub use parameters::{MonitorPolicyParameters, MonitorSettings};
pub use remote_status::RemoteState;
pub use stepwise::StepwiseMonitorPolicy;
