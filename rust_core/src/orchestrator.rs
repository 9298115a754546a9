//! Signal dispatch orchestrator
//!
//! One cycle walks the symbol universe in order, asks every configured source
//! for a verdict, and broadcasts qualifying signals that are not duplicates.
//!
//! Gates, in order:
//! 1. another cycle already in flight: the call is dropped, not queued
//! 2. local time outside the operating window
//! 3. no subscribers
//!
//! Within a cycle only a circuit breaker trip stops iteration early; every
//! other failure is contained to its (symbol, source) pair.

use crate::broadcast::Broadcaster;
use crate::circuit_breaker::{BreakerConfig, BreakerDecision, BreakerStatus, CircuitBreaker};
use crate::clients::{DeliveryTransport, SignalSource};
use crate::clock::Clock;
use crate::dedup::{DuplicateSuppressor, DEFAULT_DEDUP_WINDOW};
use crate::formatters::{format_signal_message, SignalIndex};
use crate::hours::OperatingWindow;
use crate::models::Signal;
use crate::retry::RetryPolicy;
use crate::store::{DedupStore, SubscriberStore};
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const DEFAULT_MIN_CONFIDENCE: f64 = 60.0;

// ============================================================================
// Configuration
// ============================================================================

/// Politeness delays between upstream calls
#[derive(Debug, Clone)]
pub struct PacingConfig {
    /// Base delay after every (symbol, source) evaluation
    pub pair_delay: Duration,
    /// Extra delay reached at the end of the universe, scaled by progress
    pub pair_delay_growth: Duration,
    /// Upper bound of the random jitter added to each pair delay
    pub jitter: Duration,
    /// Delay after a dispatched signal
    pub dispatch_delay: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            pair_delay: Duration::from_millis(2000),
            pair_delay_growth: Duration::from_millis(1000),
            jitter: Duration::from_millis(500),
            dispatch_delay: Duration::from_millis(3000),
        }
    }
}

impl PacingConfig {
    /// No waiting at all
    pub fn none() -> Self {
        Self {
            pair_delay: Duration::ZERO,
            pair_delay_growth: Duration::ZERO,
            jitter: Duration::ZERO,
            dispatch_delay: Duration::ZERO,
        }
    }

    /// Delay after the symbol at `position` (0-based) of `total`
    pub fn pair_delay(&self, position: usize, total: usize) -> Duration {
        let progress = if total == 0 {
            0.0
        } else {
            position as f64 / total as f64
        };
        let growth = self.pair_delay_growth.mul_f64(progress);

        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };

        self.pair_delay + growth + jitter
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Evaluated in this order every cycle
    pub symbols: Vec<String>,
    pub min_confidence: f64,
    pub window: OperatingWindow,
    pub pacing: PacingConfig,
    pub breaker: BreakerConfig,
    pub retry: RetryPolicy,
    pub dedup_window: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            window: OperatingWindow::default(),
            pacing: PacingConfig::default(),
            breaker: BreakerConfig::default(),
            retry: RetryPolicy::default(),
            dedup_window: DEFAULT_DEDUP_WINDOW,
        }
    }
}

// ============================================================================
// Cycle outcome
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle was in flight; nothing happened
    AlreadyRunning,
    OutsideHours,
    NoSubscribers,
    Completed { evaluated: usize, dispatched: usize },
    /// The circuit breaker stopped the cycle early
    Aborted { evaluated: usize, dispatched: usize },
}

/// Clears the running flag on every exit path
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunningGuard(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct Orchestrator {
    config: OrchestratorConfig,
    sources: Vec<Arc<dyn SignalSource>>,
    subscribers: Arc<dyn SubscriberStore>,
    suppressor: DuplicateSuppressor,
    breaker: CircuitBreaker,
    broadcaster: Broadcaster,
    clock: Arc<dyn Clock>,
    running: AtomicBool,
    signals_sent_today: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        sources: Vec<Arc<dyn SignalSource>>,
        subscribers: Arc<dyn SubscriberStore>,
        dedup: Arc<dyn DedupStore>,
        transport: Arc<dyn DeliveryTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let suppressor = DuplicateSuppressor::new(dedup, clock.clone(), config.dedup_window);
        let breaker = CircuitBreaker::new(config.breaker.clone());
        let broadcaster = Broadcaster::new(subscribers.clone(), transport, config.retry.clone());

        Self {
            config,
            sources,
            subscribers,
            suppressor,
            breaker,
            broadcaster,
            clock,
            running: AtomicBool::new(false),
            signals_sent_today: AtomicU64::new(0),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn signals_sent_today(&self) -> u64 {
        self.signals_sent_today.load(Ordering::SeqCst)
    }

    pub fn breaker_status(&self) -> BreakerStatus {
        self.breaker.status()
    }

    /// Run one evaluation cycle over the whole universe.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Some(_guard) = RunningGuard::acquire(&self.running) else {
            info!("Cycle already running, skipping this tick");
            return CycleOutcome::AlreadyRunning;
        };

        let now = self.clock.now();
        if !self.config.window.is_open(now) {
            info!(
                local_time = %self.config.window.local_time(now).format("%H:%M"),
                "Outside operating hours, skipping cycle"
            );
            return CycleOutcome::OutsideHours;
        }

        let subscriber_count = match self.subscribers.count().await {
            Ok(count) => count,
            Err(e) => {
                error!(error = %e, "Failed to count subscribers, skipping cycle");
                0
            }
        };
        if subscriber_count == 0 {
            info!("No subscribers, skipping cycle");
            return CycleOutcome::NoSubscribers;
        }

        info!(
            subscribers = subscriber_count,
            symbols = self.config.symbols.len(),
            sources = self.sources.len(),
            "Starting dispatch cycle"
        );

        let total = self.config.symbols.len();
        let mut evaluated = 0;
        let mut dispatched = 0;

        for (position, symbol) in self.config.symbols.iter().enumerate() {
            debug!(symbol = %symbol, "Analyzing {}/{}", position + 1, total);

            for source in &self.sources {
                evaluated += 1;

                match source.analyze(symbol).await {
                    Ok(signal) => {
                        if self.handle_signal(signal).await {
                            dispatched += 1;
                            tokio::time::sleep(self.config.pacing.dispatch_delay).await;
                        }
                    }
                    Err(e) => {
                        warn!(
                            symbol = %symbol,
                            source = source.name(),
                            error = %e,
                            "Analysis failed"
                        );
                        if self.breaker.on_failure(&e) == BreakerDecision::Abort {
                            warn!(evaluated, dispatched, "Cycle aborted by circuit breaker");
                            return CycleOutcome::Aborted {
                                evaluated,
                                dispatched,
                            };
                        }
                    }
                }

                tokio::time::sleep(self.config.pacing.pair_delay(position, total)).await;
            }
        }

        info!(evaluated, dispatched, "Dispatch cycle finished");
        CycleOutcome::Completed {
            evaluated,
            dispatched,
        }
    }

    /// Filter, dedup and broadcast one verdict. Returns whether it was sent.
    async fn handle_signal(&self, signal: Signal) -> bool {
        if !signal.direction.is_actionable() {
            debug!(
                symbol = %signal.symbol,
                source = %signal.source,
                direction = signal.direction.as_str(),
                "No trade"
            );
            return false;
        }
        if !signal.qualifies(self.config.min_confidence) {
            debug!(
                symbol = %signal.symbol,
                source = %signal.source,
                confidence = signal.confidence,
                "Confidence below {}",
                self.config.min_confidence
            );
            return false;
        }
        if !self.suppressor.should_send(&signal.symbol).await {
            info!(symbol = %signal.symbol, source = %signal.source, "Recently signaled, skipping");
            return false;
        }

        let index = self.signals_sent_today.fetch_add(1, Ordering::SeqCst) + 1;
        let message = format_signal_message(&signal, SignalIndex::Daily(index));
        let report = self.broadcaster.broadcast(&message).await;
        self.suppressor.mark_sent(&signal.symbol).await;

        info!(
            symbol = %signal.symbol,
            source = %signal.source,
            direction = signal.direction.as_str(),
            confidence = signal.confidence,
            delivered = report.success,
            failed = report.failed,
            "Signal dispatched"
        );
        true
    }
}
