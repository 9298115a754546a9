//! Signal Source Trait
//!
//! Defines the interface for pluggable analyzers. The orchestrator queries
//! every configured source in order for each symbol of the universe.

use crate::error::SourceError;
use crate::models::Signal;
use async_trait::async_trait;

/// Common trait for signal analyzers
///
/// Implementations must be Send + Sync for use in async contexts. Failures
/// must classify throttling as [`SourceError::RateLimited`] so the circuit
/// breaker can count them.
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Identifier used in logs and in the message attribution line
    fn name(&self) -> &str;

    /// Produce a verdict for `symbol` (e.g. "BTCUSDT")
    async fn analyze(&self, symbol: &str) -> Result<Signal, SourceError>;
}
