// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Step schedules shared by the monitor and recovery policies.
//!
//! A schedule is an ordered list of `(tries, delay)` steps. A step with
//! `tries <= 0` repeats forever and may only appear last. The cursor walks the
//! schedule one attempt at a time; the same transition is used to replay a
//! persisted attempt count, so a restarted policy lands on exactly the step and
//! try count it had reached before.

use std::fmt;

use crate::app::errors::{AppResult, invalid_argument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub tries: i32,
    pub delay_millis: u64,
}

impl Step {
    pub const fn new(tries: i32, delay_millis: u64) -> Self {
        Self {
            tries,
            delay_millis,
        }
    }

    pub fn is_infinite(&self) -> bool {
        self.tries <= 0
    }
}

/// Why a policy stopped handing out wait times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCode {
    TimeExpired,
    TooManyAttempts,
    TooManyFailures,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::TimeExpired => "TIME_EXPIRED",
            ReasonCode::TooManyAttempts => "TOO_MANY_ATTEMPTS",
            ReasonCode::TooManyFailures => "TOO_MANY_FAILURES",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn validate_steps(steps: &[Step]) -> AppResult<()> {
    if steps.is_empty() {
        return Err(invalid_argument("step schedule must not be empty"));
    }
    if let Some(pos) = steps.iter().position(Step::is_infinite) {
        if pos + 1 != steps.len() {
            return Err(invalid_argument(
                "only the last step of a schedule may repeat forever",
            ));
        }
    }
    Ok(())
}

/// Parse `tries:delay_millis` pairs separated by commas, e.g. `2:10000,0:300000`.
pub fn parse_steps(text: &str) -> AppResult<Vec<Step>> {
    let mut steps = Vec::new();
    for raw in text.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (tries, delay) = raw
            .split_once(':')
            .ok_or_else(|| invalid_argument(format!("invalid step '{raw}'")))?;
        let tries = tries
            .trim()
            .parse::<i32>()
            .map_err(|_| invalid_argument(format!("invalid step tries '{raw}'")))?;
        let delay = delay
            .trim()
            .parse::<u64>()
            .map_err(|_| invalid_argument(format!("invalid step delay '{raw}'")))?;
        steps.push(Step::new(tries, delay));
    }
    validate_steps(&steps)?;
    Ok(steps)
}

/// Position in a schedule: step index plus tries consumed within that step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepCursor {
    pub index: usize,
    pub tries: u32,
}

impl StepCursor {
    /// Rebuild the cursor reached after `attempts` calls to [`StepCursor::next_delay`].
    pub fn replay(steps: &[Step], attempts: u64) -> Self {
        let mut cursor = Self::default();
        for _ in 0..attempts {
            if cursor.is_settled(steps) || cursor.next_delay(steps).is_none() {
                break;
            }
        }
        cursor
    }

    /// Consume one attempt. `None` means the schedule is exhausted.
    pub fn next_delay(&mut self, steps: &[Step]) -> Option<u64> {
        let step = steps.get(self.index)?;
        if step.is_infinite() {
            return Some(step.delay_millis);
        }
        if self.tries >= step.tries as u32 {
            if self.index + 1 >= steps.len() {
                return None;
            }
            self.index += 1;
            self.tries = 0;
        }
        self.tries += 1;
        Some(steps[self.index].delay_millis)
    }

    pub fn current_step<'a>(&self, steps: &'a [Step]) -> Option<&'a Step> {
        steps.get(self.index)
    }

    // Further attempts leave the cursor untouched once it sits on a repeating step.
    fn is_settled(&self, steps: &[Step]) -> bool {
        steps.get(self.index).is_some_and(Step::is_infinite)
    }
}
