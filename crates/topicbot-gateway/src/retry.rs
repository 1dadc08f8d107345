//! Bounded exponential backoff shared by every backend call.
use std::{future::Future, time::Duration};

use crate::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Retry budget applied uniformly to every backend operation.
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(8_000),
        }
    }
}

impl RetryPolicy {
    /// Delay slept after the zero-based `attempt` fails: `min(base * 2^attempt, max)`.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exponent = attempt.min(16) as u32;
        let scaled = self.base_delay.saturating_mul(2_u32.saturating_pow(exponent));
        scaled.min(self.max_delay)
    }

    pub fn attempts(&self) -> usize {
        self.max_attempts.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Why a single attempt failed. Every kind is retried.
pub enum AttemptFailure {
    Connect(String),
    Timeout(String),
    Status { status: u16, body: String },
    Other(String),
}

impl AttemptFailure {
    pub fn from_transport(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else if error.is_connect() {
            Self::Connect(error.to_string())
        } else {
            Self::Other(error.to_string())
        }
    }

    fn into_gateway_error(self, operation: &str) -> GatewayError {
        let operation = operation.to_string();
        match self {
            Self::Connect(_) => GatewayError::Unreachable { operation },
            Self::Timeout(_) => GatewayError::TimedOut { operation },
            Self::Status { status, body } => GatewayError::Status {
                operation,
                status,
                body,
            },
            Self::Other(message) => GatewayError::Operation { operation, message },
        }
    }

    fn summary(&self) -> String {
        match self {
            Self::Connect(message) => format!("connect: {message}"),
            Self::Timeout(message) => format!("timeout: {message}"),
            Self::Status { status, .. } => format!("status {status}"),
            Self::Other(message) => message.clone(),
        }
    }
}

/// Runs `attempt_fn` until it succeeds or the policy's attempts are spent.
///
/// The closure receives the zero-based attempt index. The backoff sleep holds
/// the caller for its full duration.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut attempt_fn: F,
) -> Result<T, GatewayError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, AttemptFailure>>,
{
    let attempts = policy.attempts();
    let mut attempt = 0_usize;
    loop {
        match attempt_fn(attempt).await {
            Ok(value) => return Ok(value),
            Err(failure) => {
                if attempt + 1 >= attempts {
                    tracing::warn!(
                        operation,
                        attempts,
                        failure = %failure.summary(),
                        "backend call failed after retries"
                    );
                    return Err(failure.into_gateway_error(operation));
                }
                let delay = policy.delay_for_attempt(attempt);
                tracing::debug!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    failure = %failure.summary(),
                    "retrying backend call"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
