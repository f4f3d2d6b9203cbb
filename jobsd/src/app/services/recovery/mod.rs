// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod configs;
pub mod messages;
pub mod policies;
pub mod processor;
pub mod testers;

pub use configs::RecoveryConfig;
pub use messages::{
    JobCancelRecoverMsg, JobRecoverMsg, MsgHeader, RecoverMsg, RecoverShutdownMsg, ShutdownMode,
};
pub use processor::RecoveryProcessor;
