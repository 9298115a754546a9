//! Circuit breaker for upstream signal sources.
//!
//! This module provides:
//! - Consecutive rate-limit error tracking
//! - Early abort of the running cycle once the threshold is reached
//! - A one-shot cooldown timer that clears the error counter
//!
//! The breaker only shortens the cycle that is executing. It never blocks the
//! next scheduled cycle; that cycle simply starts from whatever counter value
//! the cooldown timer has left behind.

use crate::error::SourceError;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive rate-limit failures that abort the cycle
    pub max_consecutive_errors: u32,
    /// Delay before the error counter is cleared after a trip
    pub cooldown_duration: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_consecutive_errors: 5,
            cooldown_duration: Duration::from_secs(600), // 10 minutes
        }
    }
}

/// What the scheduler should do after a source failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerDecision {
    Continue,
    Abort,
}

/// Breaker status for reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerStatus {
    pub consecutive_errors: u32,
    pub threshold: u32,
    pub cooldown_pending: bool,
}

pub struct CircuitBreaker {
    config: BreakerConfig,
    /// Shared with cooldown timers so they can clear it
    consecutive_errors: Arc<AtomicU32>,
    /// Number of armed cooldown timers that have not fired yet
    pending_cooldowns: Arc<AtomicUsize>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            consecutive_errors: Arc::new(AtomicU32::new(0)),
            pending_cooldowns: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Record a source failure and decide whether the cycle should stop.
    ///
    /// Must be called from within a tokio runtime: tripping spawns the
    /// cooldown timer.
    pub fn on_failure(&self, error: &SourceError) -> BreakerDecision {
        if !error.is_rate_limited() {
            self.consecutive_errors.store(0, Ordering::SeqCst);
            return BreakerDecision::Continue;
        }

        let errors = self.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
        warn!(
            consecutive_errors = errors,
            threshold = self.config.max_consecutive_errors,
            "Rate-limit failure {}/{}",
            errors,
            self.config.max_consecutive_errors
        );

        if errors >= self.config.max_consecutive_errors {
            warn!(
                cooldown_secs = self.config.cooldown_duration.as_secs(),
                "Circuit breaker tripped, aborting current cycle"
            );
            self.arm_cooldown();
            return BreakerDecision::Abort;
        }

        BreakerDecision::Continue
    }

    fn arm_cooldown(&self) {
        let counter = self.consecutive_errors.clone();
        let pending = self.pending_cooldowns.clone();
        let cooldown = self.config.cooldown_duration;

        pending.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            counter.store(0, Ordering::SeqCst);
            pending.fetch_sub(1, Ordering::SeqCst);
            info!("Circuit breaker reset after cooldown");
        });
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> BreakerStatus {
        BreakerStatus {
            consecutive_errors: self.consecutive_errors(),
            threshold: self.config.max_consecutive_errors,
            cooldown_pending: self.pending_cooldowns.load(Ordering::SeqCst) > 0,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn rate_limited() -> SourceError {
        SourceError::RateLimited {
            source_name: "test".to_string(),
            status: 429,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_trips_at_threshold() {
        let cb = CircuitBreaker::default();

        for _ in 0..4 {
            assert_eq!(cb.on_failure(&rate_limited()), BreakerDecision::Continue);
        }
        assert!(!cb.status().cooldown_pending);

        assert_eq!(cb.on_failure(&rate_limited()), BreakerDecision::Abort);
        let status = cb.status();
        assert_eq!(status.consecutive_errors, 5);
        assert!(status.cooldown_pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_error_resets_counter() {
        let cb = CircuitBreaker::default();

        cb.on_failure(&rate_limited());
        cb.on_failure(&rate_limited());
        cb.on_failure(&rate_limited());
        assert_eq!(cb.consecutive_errors(), 3);

        let decision = cb.on_failure(&SourceError::Other("bad payload".to_string()));
        assert_eq!(decision, BreakerDecision::Continue);
        assert_eq!(cb.consecutive_errors(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_clears_counter() {
        let cb = CircuitBreaker::new(BreakerConfig {
            max_consecutive_errors: 2,
            cooldown_duration: Duration::from_secs(600),
        });

        cb.on_failure(&rate_limited());
        assert_eq!(cb.on_failure(&rate_limited()), BreakerDecision::Abort);

        tokio::time::sleep(Duration::from_secs(599)).await;
        assert_eq!(cb.consecutive_errors(), 2);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(cb.consecutive_errors(), 0);
        assert!(!cb.status().cooldown_pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_still_tripped_before_cooldown_fires() {
        let cb = CircuitBreaker::new(BreakerConfig {
            max_consecutive_errors: 2,
            cooldown_duration: Duration::from_secs(600),
        });

        cb.on_failure(&rate_limited());
        cb.on_failure(&rate_limited());

        // A cycle starting before the reset aborts on its first rate-limit hit
        assert_eq!(cb.on_failure(&rate_limited()), BreakerDecision::Abort);
        assert_eq!(cb.consecutive_errors(), 3);
    }
}
