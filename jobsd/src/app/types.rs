// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a job as persisted by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    StagingJob,
    SubmittingJob,
    Queued,
    Running,
    Blocked,
    Done,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::StagingJob => "STAGING_JOB",
            JobStatus::SubmittingJob => "SUBMITTING_JOB",
            JobStatus::Queued => "QUEUED",
            JobStatus::Running => "RUNNING",
            JobStatus::Blocked => "BLOCKED",
            JobStatus::Done => "DONE",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Done | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Statuses that count against a user's quota on an execution system.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            JobStatus::SubmittingJob | JobStatus::Queued | JobStatus::Running
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "STAGING_JOB" => Ok(Self::StagingJob),
            "SUBMITTING_JOB" => Ok(Self::SubmittingJob),
            "QUEUED" => Ok(Self::Queued),
            "RUNNING" => Ok(Self::Running),
            "BLOCKED" => Ok(Self::Blocked),
            "DONE" => Ok(Self::Done),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    Fork,
    Batch,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Fork => "FORK",
            JobType::Batch => "BATCH",
        }
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FORK" => Ok(Self::Fork),
            "BATCH" => Ok(Self::Batch),
            other => Err(format!("unknown job type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Runtime {
    Docker,
    Singularity,
}

/// Runtime-specific launch variant requested by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuntimeOption {
    SingularityStart,
    SingularityRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchedulerType {
    Slurm,
}

impl SchedulerType {
    pub fn as_str(self) -> &'static str {
        match self {
            SchedulerType::Slurm => "SLURM",
        }
    }
}

impl FromStr for SchedulerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SLURM" => Ok(Self::Slurm),
            other => Err(format!("unknown scheduler: {other}")),
        }
    }
}

/// Application snapshot captured on the job at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSpec {
    pub id: String,
    pub version: String,
    pub runtime: Runtime,
    #[serde(default)]
    pub runtime_options: Vec<RuntimeOption>,
    #[serde(default)]
    pub container_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVariable {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParameters {
    /// Arguments passed to the application inside the container.
    #[serde(default)]
    pub app_args: Vec<String>,
    /// Free-form container runtime CLI options, validated at staging.
    #[serde(default)]
    pub container_args: Vec<String>,
    /// Free-form scheduler options, rendered as directives for batch jobs.
    #[serde(default)]
    pub scheduler_options: Vec<String>,
    #[serde(default)]
    pub env_variables: Vec<EnvVariable>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub tenant: String,
    pub uuid: String,
    pub name: String,
    pub owner: String,
    pub job_type: JobType,
    pub max_minutes: i64,
    pub exec_system_id: String,
    pub exec_dir: String,
    pub input_dir: String,
    pub output_dir: String,
    pub app: AppSpec,
    pub parameters: JobParameters,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: i64,
    pub tenant: String,
    pub uuid: String,
    pub name: String,
    pub owner: String,
    pub status: JobStatus,
    pub job_type: JobType,
    pub max_minutes: i64,
    pub exec_system_id: String,
    pub exec_dir: String,
    pub input_dir: String,
    pub output_dir: String,
    pub app: AppSpec,
    pub parameters: JobParameters,
    pub remote_job_id: Option<String>,
    pub remote_checks_success: i64,
    pub remote_checks_failed: i64,
    pub last_message: Option<String>,
    pub cancel_requested: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Job {
    /// Total remote status checks recorded across monitor sessions.
    pub fn remote_checks(&self) -> u64 {
        (self.remote_checks_success.max(0) + self.remote_checks_failed.max(0)) as u64
    }
}

/// Payload for creating or upserting an execution system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSystem {
    pub tenant: String,
    pub id: String,
    pub host: String,
    pub port: u16,
    pub effective_user: String,
    pub identity_path: Option<String>,
    pub enabled: bool,
    pub scheduler: Option<SchedulerType>,
    pub max_jobs_per_user: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecSystem {
    pub tenant: String,
    pub id: String,
    pub host: String,
    pub port: u16,
    pub effective_user: String,
    pub identity_path: Option<String>,
    pub enabled: bool,
    pub scheduler: Option<SchedulerType>,
    pub max_jobs_per_user: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshConfig {
    pub session_name: Option<String>,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub identity_path: Option<String>,
    pub keepalive_secs: u64,
}

impl SshConfig {
    pub fn for_system(system: &ExecSystem) -> Self {
        Self {
            session_name: Some(format!("{}/{}", system.tenant, system.id)),
            host: system.host.clone(),
            port: system.port,
            username: system.effective_user.clone(),
            identity_path: system.identity_path.clone(),
            keepalive_secs: 30,
        }
    }
}

/// Why a job is blocked in recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoverConditionCode {
    SystemNotAvailable,
    ConnectionFailure,
    QuotaExceeded,
    AuthenticationFailure,
    FirstAuthenticationFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoverPolicyType {
    ConstantBackoff,
    StepwiseBackoff,
}

/// Predicate polled to decide whether a blocking condition cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoverTesterType {
    DefaultSystemAvailableTester,
    DefaultConnectionTester,
    DefaultQuotaTester,
    DefaultAuthenticationTester,
}

macro_rules! db_enum {
    ($ty:ty { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!("unknown {}: {other}", stringify!($ty))),
                }
            }
        }
    };
}

db_enum!(RecoverConditionCode {
    SystemNotAvailable => "SYSTEM_NOT_AVAILABLE",
    ConnectionFailure => "CONNECTION_FAILURE",
    QuotaExceeded => "QUOTA_EXCEEDED",
    AuthenticationFailure => "AUTHENTICATION_FAILURE",
    FirstAuthenticationFailure => "FIRST_AUTHENTICATION_FAILURE",
});

db_enum!(RecoverPolicyType {
    ConstantBackoff => "CONSTANT_BACKOFF",
    StepwiseBackoff => "STEPWISE_BACKOFF",
});

db_enum!(RecoverTesterType {
    DefaultSystemAvailableTester => "DEFAULT_SYSTEM_AVAILABLE_TESTER",
    DefaultConnectionTester => "DEFAULT_CONNECTION_TESTER",
    DefaultQuotaTester => "DEFAULT_QUOTA_TESTER",
    DefaultAuthenticationTester => "DEFAULT_AUTHENTICATION_TESTER",
});

/// Payload for creating (or attaching to) a recovery record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJobRecovery {
    pub tenant: String,
    pub condition_code: RecoverConditionCode,
    pub tester_type: RecoverTesterType,
    pub tester_params: BTreeMap<String, String>,
    pub policy_type: RecoverPolicyType,
    pub policy_params: BTreeMap<String, String>,
    pub tester_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJobBlocked {
    pub job_uuid: String,
    pub success_status: JobStatus,
    pub status_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobBlocked {
    pub recovery_id: i64,
    pub job_uuid: String,
    pub success_status: JobStatus,
    pub status_message: String,
    pub created_at: String,
}

/// Persisted blocking record shared by all jobs waiting on the same tester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecovery {
    pub id: i64,
    pub tenant: String,
    pub condition_code: RecoverConditionCode,
    pub tester_type: RecoverTesterType,
    pub tester_params: BTreeMap<String, String>,
    pub policy_type: RecoverPolicyType,
    pub policy_params: BTreeMap<String, String>,
    pub tester_hash: String,
    pub num_attempts: i64,
    pub created_at: String,
    pub last_updated: String,
    pub blocked: Vec<JobBlocked>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_round_trips_through_text() {
        for status in [
            JobStatus::Pending,
            JobStatus::StagingJob,
            JobStatus::SubmittingJob,
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Blocked,
            JobStatus::Done,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("ARCHIVING".parse::<JobStatus>().is_err());
    }

    #[test]
    fn terminal_and_active_statuses() {
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Blocked.is_terminal());
        assert!(JobStatus::Queued.is_active());
        assert!(!JobStatus::Pending.is_active());
    }

    #[test]
    fn recovery_enums_parse_their_db_names() {
        assert_eq!(
            "DEFAULT_CONNECTION_TESTER".parse::<RecoverTesterType>().unwrap(),
            RecoverTesterType::DefaultConnectionTester
        );
        assert_eq!(
            RecoverPolicyType::StepwiseBackoff.to_string(),
            "STEPWISE_BACKOFF"
        );
        assert!("SOMETHING".parse::<RecoverConditionCode>().is_err());
    }

    #[test]
    fn app_spec_defaults_optional_fields() {
        let spec: AppSpec =
            serde_json::from_str(r#"{"id":"sleep","version":"1.0","runtime":"Docker"}"#).unwrap();
        assert!(spec.runtime_options.is_empty());
        assert!(spec.container_image.is_none());
    }
}
