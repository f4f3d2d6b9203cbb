// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Named recovery configurations and transient-error classification.

use std::collections::BTreeMap;

use crate::app::errors::{AppError, codes};
use crate::app::types::{
    ExecSystem, Job, RecoverConditionCode, RecoverPolicyType, RecoverTesterType,
};

pub const PARAM_WAIT_MILLIS: &str = "waitMillis";
pub const PARAM_MAX_TRIES: &str = "maxTries";
pub const PARAM_MAX_ELAPSED_MINUTES: &str = "maxElapsedMinutes";
pub const PARAM_STEPS: &str = "steps";

/// Fixes the condition, policy and tester used when a job blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryConfig {
    pub name: &'static str,
    pub condition_code: RecoverConditionCode,
    pub policy_type: RecoverPolicyType,
    pub tester_type: RecoverTesterType,
    policy_defaults: &'static [(&'static str, &'static str)],
}

impl RecoveryConfig {
    pub fn policy_params(&self) -> BTreeMap<String, String> {
        self.policy_defaults
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Parameters identifying the condition; jobs with equal parameters share a record.
    pub fn tester_params(&self, job: &Job, system: &ExecSystem) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("tenant".to_string(), job.tenant.clone());
        params.insert("systemId".to_string(), system.id.clone());
        match self.tester_type {
            RecoverTesterType::DefaultSystemAvailableTester => {}
            RecoverTesterType::DefaultConnectionTester
            | RecoverTesterType::DefaultAuthenticationTester => {
                params.insert("host".to_string(), system.host.clone());
                params.insert("port".to_string(), system.port.to_string());
                params.insert("user".to_string(), system.effective_user.clone());
            }
            RecoverTesterType::DefaultQuotaTester => {
                params.insert("owner".to_string(), job.owner.clone());
            }
        }
        params
    }
}

pub const DFT_SYSTEM_NOT_AVAILABLE: RecoveryConfig = RecoveryConfig {
    name: "DFT_SYSTEM_NOT_AVAILABLE",
    condition_code: RecoverConditionCode::SystemNotAvailable,
    policy_type: RecoverPolicyType::StepwiseBackoff,
    tester_type: RecoverTesterType::DefaultSystemAvailableTester,
    policy_defaults: &[],
};

pub const DFT_CONNECTION_FAILURE: RecoveryConfig = RecoveryConfig {
    name: "DFT_CONNECTION_FAILURE",
    condition_code: RecoverConditionCode::ConnectionFailure,
    policy_type: RecoverPolicyType::StepwiseBackoff,
    tester_type: RecoverTesterType::DefaultConnectionTester,
    policy_defaults: &[],
};

pub const DFT_QUOTA_EXCEEDED: RecoveryConfig = RecoveryConfig {
    name: "DFT_QUOTA_EXCEEDED",
    condition_code: RecoverConditionCode::QuotaExceeded,
    policy_type: RecoverPolicyType::ConstantBackoff,
    tester_type: RecoverTesterType::DefaultQuotaTester,
    policy_defaults: &[(PARAM_WAIT_MILLIS, "120000")],
};

pub const DFT_AUTHENTICATION_FAILURE: RecoveryConfig = RecoveryConfig {
    name: "DFT_AUTHENTICATION_FAILURE",
    condition_code: RecoverConditionCode::AuthenticationFailure,
    policy_type: RecoverPolicyType::StepwiseBackoff,
    tester_type: RecoverTesterType::DefaultAuthenticationTester,
    policy_defaults: &[],
};

/// Credentials that never worked for this job get a short leash.
pub const FIRST_AUTHENTICATION_FAILURE: RecoveryConfig = RecoveryConfig {
    name: "FIRST_AUTHENTICATION_FAILURE",
    condition_code: RecoverConditionCode::FirstAuthenticationFailure,
    policy_type: RecoverPolicyType::ConstantBackoff,
    tester_type: RecoverTesterType::DefaultAuthenticationTester,
    policy_defaults: &[(PARAM_WAIT_MILLIS, "60000"), (PARAM_MAX_TRIES, "10")],
};

/// Pick the recovery configuration for a transient error; `None` means fatal.
/// `first_contact` is true while the job has never reached the remote host.
pub fn classify(err: &AppError, first_contact: bool) -> Option<&'static RecoveryConfig> {
    match err.code() {
        codes::SYSTEM_NOT_AVAILABLE => Some(&DFT_SYSTEM_NOT_AVAILABLE),
        codes::CONNECTION_FAILURE => Some(&DFT_CONNECTION_FAILURE),
        codes::QUOTA_EXCEEDED => Some(&DFT_QUOTA_EXCEEDED),
        codes::AUTHENTICATION_FAILURE if first_contact => Some(&FIRST_AUTHENTICATION_FAILURE),
        codes::AUTHENTICATION_FAILURE => Some(&DFT_AUTHENTICATION_FAILURE),
        _ => None,
    }
}
