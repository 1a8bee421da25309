//! Retry policy with linear backoff

use crate::core::{FailureRecord, StepDescriptor};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How many times a step is attempted and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts per step, including the first one
    pub max_retries: usize,

    /// Backoff unit; the wait after attempt `n` is `base_delay_ms * n`
    pub base_delay_ms: u64,

    /// Wait at least the backend's retry-after hint when one is given
    pub honor_retry_after: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            honor_retry_after: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            honor_retry_after: false,
        }
    }

    pub fn with_retry_after(mut self, honor: bool) -> Self {
        self.honor_retry_after = honor;
        self
    }

    /// Attempt limit for a step; a non-retryable step gets exactly one
    pub fn attempts_for(&self, step: &StepDescriptor) -> usize {
        if !step.retryable {
            return 1;
        }
        step.max_retries.unwrap_or(self.max_retries).max(1)
    }

    /// Linear backoff after the given 1-based attempt
    pub fn backoff(&self, attempt: usize) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(attempt as u64))
    }

    /// Wait before the next attempt, given why the last one failed
    pub fn delay_for(&self, attempt: usize, failure: &FailureRecord) -> Duration {
        let linear = self.backoff(attempt);
        match failure.retry_after_seconds {
            Some(seconds) if self.honor_retry_after => linear.max(Duration::from_secs(seconds)),
            _ => linear,
        }
    }
}
