use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A single retry attempt record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryAttempt {
    /// 1-based attempt number.
    pub attempt: u8,
    /// Error message from the failed attempt.
    pub error: String,
    /// When this attempt occurred.
    pub timestamp: DateTime<Utc>,
}

impl RetryAttempt {
    pub fn new(attempt: u8, error: impl Into<String>) -> Self {
        Self {
            attempt,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Bounds for retrying a fallible operation with exponential backoff.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first failure. Default: 3.
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
    /// Delay before the first retry. Default: 200ms.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound for any single delay. Default: 5000ms.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u8 {
    3
}
fn default_base_delay_ms() -> u64 {
    200
}
fn default_max_delay_ms() -> u64 {
    5000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u8) -> Duration {
        calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms)
    }
}

/// Error returned once every attempt has failed.
#[derive(Debug)]
pub struct RetriesExhausted<E> {
    /// The error from the final attempt.
    pub last_error: E,
    pub history: Vec<RetryAttempt>,
}

/// Run `op` until it succeeds or the policy's retries are used up.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, RetriesExhausted<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut history = Vec::new();
    let mut attempt: u8 = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt = attempt.saturating_add(1);
                history.push(RetryAttempt::new(attempt, e.to_string()));

                if attempt > policy.max_retries {
                    return Err(RetriesExhausted {
                        last_error: e,
                        history,
                    });
                }

                let delay = policy.backoff(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying storage operation"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Calculate exponential backoff delay with jitter.
///
/// Formula: `min(base_ms * 2^(attempt-1) + jitter, max_ms)` (0-25% jitter)
pub fn calculate_backoff(attempt: u8, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exp_factor = 2u64.saturating_pow((attempt - 1) as u32);
    let delay_ms = base_ms.saturating_mul(exp_factor);

    let jitter = if delay_ms > 0 {
        rand::rng().random_range(0..=delay_ms / 4)
    } else {
        0
    };

    let total_delay = delay_ms.saturating_add(jitter).min(max_ms);
    Duration::from_millis(total_delay)
}
