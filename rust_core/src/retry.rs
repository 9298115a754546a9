//! Retry policy for outbound deliveries
//!
//! Provides bounded retry with linear backoff, decoupled from the operation
//! being retried so the policy can be tested on its own.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Backoff before retry `n` is `base_backoff * n`
    pub base_backoff: Duration,
    /// Pause after a successful delivery before moving to the next recipient
    pub inter_message_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(1000),
            inter_message_delay: Duration::from_millis(80),
        }
    }
}

impl RetryPolicy {
    /// Wait after failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff * attempt
    }
}

/// Result of a retried operation together with the attempts it took
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

/// Run `f` until it succeeds, fails with a non-retriable error, or the policy
/// runs out of attempts. `f` receives the 1-based attempt number.
///
/// # Example
/// ```ignore
/// let outcome = execute_with_policy(
///     &RetryPolicy::default(),
///     |_attempt| transport.send(&chat_id, &text),
///     |e: &DeliveryError| !e.is_terminal(),
/// )
/// .await;
/// ```
pub async fn execute_with_policy<F, Fut, T, E, R>(
    policy: &RetryPolicy,
    mut f: F,
    is_retriable: R,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(e) if attempt < max_attempts && is_retriable(&e) => {
                let backoff = policy.backoff(attempt);
                warn!(
                    "Attempt {}/{} failed: {}. Retrying in {}ms",
                    attempt,
                    max_attempts,
                    e,
                    backoff.as_millis()
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                return RetryOutcome {
                    result: Err(e),
                    attempts: attempt,
                }
            }
        }
    }
}
