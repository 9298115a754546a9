//! Duplicate suppression for dispatched signals
//!
//! A symbol may only be broadcast once per dedup window. The window runs from
//! the last successful dispatch, never from the last evaluation, and is keyed
//! by symbol alone: a dispatch from one source suppresses every other source
//! for that symbol until the window elapses.

use crate::clock::Clock;
use crate::models::dedup_key;
use crate::store::DedupStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Minimum time between two dispatches of the same symbol (1 hour)
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(3600);

pub struct DuplicateSuppressor {
    store: Arc<dyn DedupStore>,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl DuplicateSuppressor {
    pub fn new(store: Arc<dyn DedupStore>, clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self {
            store,
            clock,
            window,
        }
    }

    /// True if no dispatch is recorded for `symbol` or the window has elapsed.
    ///
    /// A failed store read counts as "no record".
    pub async fn should_send(&self, symbol: &str) -> bool {
        let key = dedup_key(symbol);
        let last_sent = match self.store.get(&key).await {
            Ok(last) => last,
            Err(e) => {
                warn!(symbol = %key, error = %e, "Dedup read failed, treating as unsent");
                None
            }
        };

        let Some(last_sent) = last_sent else {
            return true;
        };

        let elapsed = self.clock.now_epoch() - last_sent;
        if elapsed < self.window.as_secs() as i64 {
            debug!(
                symbol = %key,
                elapsed_secs = elapsed,
                "Duplicate within window ({}s < {}s)",
                elapsed,
                self.window.as_secs()
            );
            return false;
        }
        true
    }

    /// Record a successful dispatch of `symbol` at the current time.
    ///
    /// Write failures are logged and otherwise ignored.
    pub async fn mark_sent(&self, symbol: &str) {
        let key = dedup_key(symbol);
        let now = self.clock.now_epoch();
        if let Err(e) = self.store.set(&key, now).await {
            error!(symbol = %key, error = %e, "Failed to record dispatch timestamp");
        }
    }
}
