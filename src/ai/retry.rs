// retry.rs — Attempt budget, backoff schedule and retry classification.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::AiError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Which failures are worth another attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RetryMode {
    /// Retry every delivery failure regardless of HTTP status.
    #[default]
    Always,
    /// Retry connection errors, unreadable bodies and HTTP 408/429/5xx only.
    TransientOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for every attempt after that.
    pub base_delay: Duration,
    pub mode: RetryMode,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            mode: RetryMode::Always,
        }
    }
}

impl RetryPolicy {
    /// `max_attempts` of zero still makes one attempt.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Backoff after the zero-based `attempt` failed: `2^attempt * base_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    pub fn should_retry(&self, err: &AiError) -> bool {
        match err {
            AiError::ConnectionError(_) | AiError::MalformedBody(_) => true,
            AiError::HttpError { status, .. } => match self.mode {
                RetryMode::Always => true,
                RetryMode::TransientOnly => *status == 408 || *status == 429 || *status >= 500,
            },
            // The request went through; asking again will not change the answer.
            AiError::EmptyOrMalformedResponse(_) | AiError::ConfigError(_) => false,
        }
    }
}
