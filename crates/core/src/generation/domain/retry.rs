use std::time::Duration;

use crate::generation::domain::generation_backend::GenerationOutcome;
use crate::shared::constants::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY_MS};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_ATTEMPTS,
            Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        )
    }
}

/// How a retried operation ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryResult {
    Succeeded { outputs: Vec<String>, attempts: u32 },
    Fatal { reason: String, attempts: u32 },
    Exhausted { last_reason: String, attempts: u32 },
}

impl RetryResult {
    pub fn outputs(&self) -> Option<&[String]> {
        match self {
            RetryResult::Succeeded { outputs, .. } => Some(outputs),
            _ => None,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryResult::Succeeded { attempts, .. }
            | RetryResult::Fatal { attempts, .. }
            | RetryResult::Exhausted { attempts, .. } => *attempts,
        }
    }
}

/// Calls `op` until it succeeds, fails fatally, or `policy.max_attempts` is
/// reached, sleeping `policy.delay` between attempts.
///
/// `op` receives the 1-based attempt number. `label` names the operation in
/// log lines.
pub fn retry_with_backoff<F>(policy: &RetryPolicy, label: &str, mut op: F) -> RetryResult
where
    F: FnMut(u32) -> GenerationOutcome,
{
    let max = policy.max_attempts.max(1);
    let mut last_reason = String::new();

    for attempt in 1..=max {
        match op(attempt) {
            GenerationOutcome::Success(outputs) => {
                if attempt > 1 {
                    log::info!("{label} succeeded on attempt {attempt}/{max}");
                }
                return RetryResult::Succeeded {
                    outputs,
                    attempts: attempt,
                };
            }
            GenerationOutcome::FatalFailure(reason) => {
                log::error!("{label} failed permanently on attempt {attempt}/{max}: {reason}");
                return RetryResult::Fatal {
                    reason,
                    attempts: attempt,
                };
            }
            GenerationOutcome::RetryableFailure(reason) => {
                log::warn!("{label} attempt {attempt}/{max} failed: {reason}");
                last_reason = reason;
                if attempt < max && !policy.delay.is_zero() {
                    std::thread::sleep(policy.delay);
                }
            }
        }
    }

    log::error!("{label} gave up after {max} attempts");
    RetryResult::Exhausted {
        last_reason,
        attempts: max,
    }
}
