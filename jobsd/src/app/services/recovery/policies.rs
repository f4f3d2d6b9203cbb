// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Backoff policies over recovery attempts.
//!
//! Both policies resume from the attempt count persisted on the recovery record
//! and measure their time window from the record's creation.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::app::errors::{AppResult, invalid_argument};
use crate::app::ports::ClockPort;
use crate::app::services::backoff::{ReasonCode, Step, StepCursor, parse_steps};
use crate::app::services::recovery::configs::{
    PARAM_MAX_ELAPSED_MINUTES, PARAM_MAX_TRIES, PARAM_STEPS, PARAM_WAIT_MILLIS,
};
use crate::app::types::{JobRecovery, RecoverPolicyType};

pub const MIN_CONSTANT_WAIT_MILLIS: u64 = 60_000;
pub const DEFAULT_MAX_ELAPSED_MINUTES: i64 = 48 * 60;

pub const DEFAULT_RECOVERY_STEPS: [Step; 5] = [
    Step::new(2, 10_000),
    Step::new(10, 20_000),
    Step::new(10, 60_000),
    Step::new(100, 120_000),
    Step::new(0, 300_000),
];

pub trait RecoverPolicy: Send {
    /// Wait before the next recovery attempt; `None` exactly when a reason code is set.
    fn millis_to_wait(&mut self) -> Option<u64>;
    fn reason_code(&self) -> Option<ReasonCode>;
    fn attempts(&self) -> u64;
}

fn param<T: FromStr>(params: &BTreeMap<String, String>, key: &str) -> AppResult<Option<T>> {
    match params.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| {
                invalid_argument(format!("invalid recovery policy parameter {key}={raw}"))
            }),
    }
}

fn deadline(recovery: &JobRecovery, clock: &dyn ClockPort) -> AppResult<OffsetDateTime> {
    let minutes = param::<i64>(&recovery.policy_params, PARAM_MAX_ELAPSED_MINUTES)?
        .unwrap_or(DEFAULT_MAX_ELAPSED_MINUTES);
    let created = OffsetDateTime::parse(&recovery.created_at, &Rfc3339).unwrap_or_else(|err| {
        tracing::warn!(
            recovery = recovery.id,
            "unparsable recovery created_at '{}': {err}",
            recovery.created_at
        );
        clock.now_utc()
    });
    minutes
        .checked_mul(60)
        .map(time::Duration::seconds)
        .and_then(|window| created.checked_add(window))
        .ok_or_else(|| {
            invalid_argument(format!(
                "recovery policy parameter {PARAM_MAX_ELAPSED_MINUTES}={minutes} is out of range"
            ))
        })
}

pub struct ConstantBackoffPolicy {
    wait_millis: u64,
    max_tries: Option<u64>,
    attempts: u64,
    deadline: OffsetDateTime,
    clock: Arc<dyn ClockPort>,
    reason: Option<ReasonCode>,
}

impl ConstantBackoffPolicy {
    pub fn from_recovery(recovery: &JobRecovery, clock: Arc<dyn ClockPort>) -> AppResult<Self> {
        let params = &recovery.policy_params;
        let wait_millis = param::<u64>(params, PARAM_WAIT_MILLIS)?
            .unwrap_or(MIN_CONSTANT_WAIT_MILLIS)
            .max(MIN_CONSTANT_WAIT_MILLIS);
        let max_tries = param::<u64>(params, PARAM_MAX_TRIES)?;
        Ok(Self {
            wait_millis,
            max_tries,
            attempts: recovery.num_attempts.max(0) as u64,
            deadline: deadline(recovery, clock.as_ref())?,
            clock,
            reason: None,
        })
    }
}

impl RecoverPolicy for ConstantBackoffPolicy {
    fn millis_to_wait(&mut self) -> Option<u64> {
        if self.reason.is_some() {
            return None;
        }
        if self.clock.now_utc() >= self.deadline {
            self.reason = Some(ReasonCode::TimeExpired);
            return None;
        }
        if self.max_tries.is_some_and(|max| self.attempts >= max) {
            self.reason = Some(ReasonCode::TooManyAttempts);
            return None;
        }
        self.attempts += 1;
        Some(self.wait_millis)
    }

    fn reason_code(&self) -> Option<ReasonCode> {
        self.reason
    }

    fn attempts(&self) -> u64 {
        self.attempts
    }
}

pub struct StepwiseBackoffPolicy {
    steps: Vec<Step>,
    cursor: StepCursor,
    attempts: u64,
    deadline: OffsetDateTime,
    clock: Arc<dyn ClockPort>,
    reason: Option<ReasonCode>,
}

impl StepwiseBackoffPolicy {
    pub fn from_recovery(recovery: &JobRecovery, clock: Arc<dyn ClockPort>) -> AppResult<Self> {
        let steps = match recovery.policy_params.get(PARAM_STEPS) {
            Some(text) => parse_steps(text)?,
            None => DEFAULT_RECOVERY_STEPS.to_vec(),
        };
        let attempts = recovery.num_attempts.max(0) as u64;
        Ok(Self {
            cursor: StepCursor::replay(&steps, attempts),
            steps,
            attempts,
            deadline: deadline(recovery, clock.as_ref())?,
            clock,
            reason: None,
        })
    }
}

impl RecoverPolicy for StepwiseBackoffPolicy {
    fn millis_to_wait(&mut self) -> Option<u64> {
        if self.reason.is_some() {
            return None;
        }
        if self.clock.now_utc() >= self.deadline {
            self.reason = Some(ReasonCode::TimeExpired);
            return None;
        }
        match self.cursor.next_delay(&self.steps) {
            Some(wait) => {
                self.attempts += 1;
                Some(wait)
            }
            None => {
                self.reason = Some(ReasonCode::TooManyAttempts);
                None
            }
        }
    }

    fn reason_code(&self) -> Option<ReasonCode> {
        self.reason
    }

    fn attempts(&self) -> u64 {
        self.attempts
    }
}

pub fn policy_for(
    recovery: &JobRecovery,
    clock: Arc<dyn ClockPort>,
) -> AppResult<Box<dyn RecoverPolicy>> {
    Ok(match recovery.policy_type {
        RecoverPolicyType::ConstantBackoff => {
            Box::new(ConstantBackoffPolicy::from_recovery(recovery, clock)?)
        }
        RecoverPolicyType::StepwiseBackoff => {
            Box::new(StepwiseBackoffPolicy::from_recovery(recovery, clock)?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::errors::codes;
    use crate::app::ports::clock::ManualClock;
    use crate::app::types::{RecoverConditionCode, RecoverTesterType};
    use time::macros::datetime;

    fn recovery(
        policy_type: RecoverPolicyType,
        params: &[(&str, &str)],
        attempts: i64,
    ) -> JobRecovery {
        JobRecovery {
            id: 1,
            tenant: "dev".into(),
            condition_code: RecoverConditionCode::ConnectionFailure,
            tester_type: RecoverTesterType::DefaultConnectionTester,
            tester_params: BTreeMap::new(),
            policy_type,
            policy_params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            tester_hash: "h".into(),
            num_attempts: attempts,
            created_at: "2026-03-01T12:00:00Z".into(),
            last_updated: "2026-03-01T12:00:00Z".into(),
            blocked: Vec::new(),
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(datetime!(2026-03-01 12:00 UTC)))
    }

    #[test]
    fn constant_wait_is_clamped_to_minimum() {
        let rec = recovery(RecoverPolicyType::ConstantBackoff, &[(PARAM_WAIT_MILLIS, "5000")], 0);
        let mut p = ConstantBackoffPolicy::from_recovery(&rec, clock()).unwrap();
        assert_eq!(p.millis_to_wait(), Some(MIN_CONSTANT_WAIT_MILLIS));
    }

    #[test]
    fn constant_max_tries_counts_persisted_attempts() {
        let rec = recovery(RecoverPolicyType::ConstantBackoff, &[(PARAM_MAX_TRIES, "3")], 2);
        let mut p = ConstantBackoffPolicy::from_recovery(&rec, clock()).unwrap();
        assert!(p.millis_to_wait().is_some());
        assert_eq!(p.reason_code(), None);
        assert_eq!(p.millis_to_wait(), None);
        assert_eq!(p.reason_code(), Some(ReasonCode::TooManyAttempts));
    }

    #[test]
    fn window_expiry_yields_time_expired() {
        let clock = clock();
        let rec = recovery(RecoverPolicyType::ConstantBackoff, &[], 0);
        let mut p = ConstantBackoffPolicy::from_recovery(&rec, clock.clone()).unwrap();
        assert!(p.millis_to_wait().is_some());
        clock.advance(time::Duration::hours(48));
        assert_eq!(p.millis_to_wait(), None);
        assert_eq!(p.reason_code(), Some(ReasonCode::TimeExpired));

        let rec = recovery(
            RecoverPolicyType::StepwiseBackoff,
            &[(PARAM_MAX_ELAPSED_MINUTES, "30")],
            0,
        );
        let mut p = StepwiseBackoffPolicy::from_recovery(&rec, clock).unwrap();
        assert_eq!(p.millis_to_wait(), None);
        assert_eq!(p.reason_code(), Some(ReasonCode::TimeExpired));
    }

    #[test]
    fn oversized_window_is_rejected() {
        let huge = i64::MAX.to_string();
        let types = [RecoverPolicyType::ConstantBackoff, RecoverPolicyType::StepwiseBackoff];
        for policy_type in types {
            let rec = recovery(policy_type, &[(PARAM_MAX_ELAPSED_MINUTES, &huge)], 0);
            let err = policy_for(&rec, clock()).err().unwrap();
            assert_eq!(err.code(), codes::INVALID_ARGUMENT);
        }
        let rec = recovery(
            RecoverPolicyType::ConstantBackoff,
            &[(PARAM_MAX_ELAPSED_MINUTES, "10000000000000")],
            0,
        );
        assert!(policy_for(&rec, clock()).is_err());
    }

    #[test]
    fn stepwise_resumes_from_num_attempts() {
        let rec = recovery(RecoverPolicyType::StepwiseBackoff, &[], 0);
        let mut fresh = StepwiseBackoffPolicy::from_recovery(&rec, clock()).unwrap();
        let waits: Vec<u64> = (0..13).filter_map(|_| fresh.millis_to_wait()).collect();
        assert_eq!(waits[0], 10_000);
        assert_eq!(waits[2], 20_000);
        assert_eq!(waits[12], 60_000);

        let rec = recovery(RecoverPolicyType::StepwiseBackoff, &[], 12);
        let mut resumed = StepwiseBackoffPolicy::from_recovery(&rec, clock()).unwrap();
        assert_eq!(resumed.millis_to_wait(), Some(60_000));
        assert_eq!(resumed.attempts(), 13);
    }

    #[test]
    fn stepwise_custom_finite_schedule_exhausts() {
        let rec = recovery(RecoverPolicyType::StepwiseBackoff, &[(PARAM_STEPS, "2:10,1:20")], 0);
        let mut p = policy_for(&rec, clock()).unwrap();
        assert_eq!(p.millis_to_wait(), Some(10));
        assert_eq!(p.millis_to_wait(), Some(10));
        assert_eq!(p.millis_to_wait(), Some(20));
        assert_eq!(p.millis_to_wait(), None);
        assert_eq!(p.reason_code(), Some(ReasonCode::TooManyAttempts));
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let rec = recovery(RecoverPolicyType::ConstantBackoff, &[(PARAM_MAX_TRIES, "many")], 0);
        assert!(policy_for(&rec, clock()).is_err());
    }
}
