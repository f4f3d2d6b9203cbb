// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

use crate::app::services::recovery::configs::RecoveryConfig;
use crate::app::types::{
    Job, JobStatus, NewJobBlocked, NewJobRecovery, RecoverConditionCode, RecoverPolicyType,
    RecoverTesterType,
};

static NEXT_CORRELATION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide, strictly increasing; used for log correlation only.
pub fn next_correlation_id() -> u64 {
    NEXT_CORRELATION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Digest over the tester type name and the key-sorted JSON of its parameters.
pub fn tester_hash(tester_type: RecoverTesterType, params: &BTreeMap<String, String>) -> String {
    // BTreeMap serializes in key order, which makes the JSON canonical.
    let json = serde_json::to_string(params).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(tester_type.as_str().as_bytes());
    hasher.update(json.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverMsgType {
    Recover,
    CancelRecover,
    RecoverShutdown,
}

impl fmt::Display for RecoverMsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecoverMsgType::Recover => "RECOVER",
            RecoverMsgType::CancelRecover => "CANCEL_RECOVER",
            RecoverMsgType::RecoverShutdown => "RECOVER_SHUTDOWN",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgHeader {
    pub correlation_id: u64,
    pub sender_id: String,
}

impl MsgHeader {
    pub fn new(sender_id: &str) -> Self {
        Self {
            correlation_id: next_correlation_id(),
            sender_id: sender_id.to_string(),
        }
    }
}

/// Park a job until the condition described by its tester clears.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecoverMsg {
    pub header: MsgHeader,
    pub tenant: String,
    pub job_uuid: String,
    pub condition_code: RecoverConditionCode,
    pub policy_type: RecoverPolicyType,
    pub policy_params: BTreeMap<String, String>,
    pub tester_type: RecoverTesterType,
    pub tester_params: BTreeMap<String, String>,
    pub tester_hash: String,
    pub success_status: JobStatus,
    pub status_message: String,
}

impl JobRecoverMsg {
    pub fn new<I>(
        config: &RecoveryConfig,
        job: &Job,
        tester_params: I,
        success_status: JobStatus,
        status_message: impl Into<String>,
        sender_id: &str,
    ) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let tester_params: BTreeMap<String, String> = tester_params.into_iter().collect();
        Self {
            header: MsgHeader::new(sender_id),
            tenant: job.tenant.clone(),
            job_uuid: job.uuid.clone(),
            condition_code: config.condition_code,
            policy_type: config.policy_type,
            policy_params: config.policy_params(),
            tester_type: config.tester_type,
            tester_hash: tester_hash(config.tester_type, &tester_params),
            tester_params,
            success_status,
            status_message: status_message.into(),
        }
    }

    pub fn to_records(&self) -> (NewJobRecovery, NewJobBlocked) {
        (
            NewJobRecovery {
                tenant: self.tenant.clone(),
                condition_code: self.condition_code,
                tester_type: self.tester_type,
                tester_params: self.tester_params.clone(),
                policy_type: self.policy_type,
                policy_params: self.policy_params.clone(),
                tester_hash: self.tester_hash.clone(),
            },
            NewJobBlocked {
                job_uuid: self.job_uuid.clone(),
                success_status: self.success_status,
                status_message: self.status_message.clone(),
            },
        )
    }
}

/// Force a job out of recovery into a terminal status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCancelRecoverMsg {
    pub header: MsgHeader,
    pub tenant: String,
    pub job_uuid: String,
    pub new_status: JobStatus,
    pub status_message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Let runners finish their current wait or test.
    Graceful,
    /// Abort runners immediately.
    Forced,
}

/// Stop recovery runners of one tenant, or of every tenant when `tenant` is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoverShutdownMsg {
    pub header: MsgHeader,
    pub tenant: Option<String>,
    pub mode: ShutdownMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverMsg {
    Recover(JobRecoverMsg),
    CancelRecover(JobCancelRecoverMsg),
    Shutdown(RecoverShutdownMsg),
}

impl RecoverMsg {
    pub fn msg_type(&self) -> RecoverMsgType {
        match self {
            RecoverMsg::Recover(_) => RecoverMsgType::Recover,
            RecoverMsg::CancelRecover(_) => RecoverMsgType::CancelRecover,
            RecoverMsg::Shutdown(_) => RecoverMsgType::RecoverShutdown,
        }
    }

    pub fn header(&self) -> &MsgHeader {
        match self {
            RecoverMsg::Recover(msg) => &msg.header,
            RecoverMsg::CancelRecover(msg) => &msg.header,
            RecoverMsg::Shutdown(msg) => &msg.header,
        }
    }
}
