//! Retry logic.
//!
//! # Responsibilities
//! - Attempt one logical operation up to the configured number of times
//! - Classify failures: transient backend errors retry, everything else fails fast
//! - Sleep with exponential backoff between attempts
//! - Report the overall outcome to the circuit breaker exactly once

use std::future::Future;
use std::time::Duration;

use crate::error::GatewayError;
use crate::resilience::backoff::{apply_jitter, calculate_backoff};
use crate::resilience::circuit_breaker::CircuitBreaker;

/// Retry policy for one gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// When false, exactly one attempt is made.
    pub enabled: bool,
    /// Total attempts permitted when enabled.
    pub max_retries: u32,
    /// Backoff base unit.
    pub base_delay: Duration,
    /// Backoff ceiling.
    pub max_delay: Duration,
    /// Extra random delay as a share of the computed delay, in `[0, 1]`.
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter_ratio: 0.0,
        }
    }
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        if self.enabled {
            self.max_retries.max(1)
        } else {
            1
        }
    }

    /// Delay after failed attempt `attempt` (numbered from 1).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = calculate_backoff(
            attempt,
            self.base_delay.as_millis() as u64,
            self.max_delay.as_millis() as u64,
        );
        apply_jitter(delay, self.jitter_ratio)
    }

    /// Run `operation` under this policy.
    ///
    /// The closure receives the attempt number. The breaker, if given, hears
    /// about the final outcome once; errors that never reached the backend are
    /// not reported.
    pub async fn run<T, F, Fut>(
        &self,
        breaker: Option<&CircuitBreaker>,
        mut operation: F,
    ) -> Result<T, GatewayError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0;

        let outcome = loop {
            attempt += 1;

            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, "Operation succeeded after retry");
                    }
                    break Ok(value);
                }
                Err(error) => {
                    if !error.is_retryable() {
                        tracing::debug!(attempt, error = %error, "Failure is not retryable");
                        break Err(error);
                    }

                    if attempt >= max_attempts {
                        if self.enabled {
                            tracing::warn!(attempts = attempt, error = %error, "Retries exhausted");
                            break Err(error.into_exhausted(attempt));
                        }
                        break Err(error);
                    }

                    let delay = self.delay_for(attempt);
                    tracing::info!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying after backend failure"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };

        if let Some(breaker) = breaker {
            match &outcome {
                Ok(_) => breaker.record_success(),
                Err(error) if error.is_backend_failure() => breaker.record_failure(),
                Err(_) => {}
            }
        }

        outcome
    }
}
