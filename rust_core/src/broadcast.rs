//! Broadcast fan-out
//!
//! Delivers one rendered message to every current subscriber. Each recipient
//! gets its own bounded retry; a terminal failure removes the recipient from
//! the store, a transient one is retried and then given up on. No single
//! recipient can abort the broadcast.

use crate::clients::DeliveryTransport;
use crate::error::DeliveryError;
use crate::retry::{execute_with_policy, RetryPolicy};
use crate::store::SubscriberStore;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub success: usize,
    pub failed: usize,
    /// Subscribers pruned after a terminal delivery error
    pub removed: Vec<String>,
}

pub struct Broadcaster {
    store: Arc<dyn SubscriberStore>,
    transport: Arc<dyn DeliveryTransport>,
    policy: RetryPolicy,
}

impl Broadcaster {
    pub fn new(
        store: Arc<dyn SubscriberStore>,
        transport: Arc<dyn DeliveryTransport>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            transport,
            policy,
        }
    }

    /// Send `message` to every subscriber currently in the store.
    pub async fn broadcast(&self, message: &str) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        let subscribers = match self.store.list_all().await {
            Ok(subscribers) => subscribers,
            Err(e) => {
                error!(error = %e, "Failed to load subscribers, nothing sent");
                return report;
            }
        };

        let transport = self.transport.as_ref();
        for subscriber in subscribers {
            let id = subscriber.id.as_str();
            let outcome = execute_with_policy(
                &self.policy,
                move |_attempt| transport.send(id, message),
                |e: &DeliveryError| !e.is_terminal(),
            )
            .await;

            match outcome.result {
                Ok(()) => {
                    report.success += 1;
                    debug!(recipient = %id, attempts = outcome.attempts, "Delivered");
                    tokio::time::sleep(self.policy.inter_message_delay).await;
                }
                Err(e) if e.is_terminal() => {
                    report.failed += 1;
                    warn!(
                        recipient = %id,
                        error = %e,
                        "Recipient unreachable, removing subscriber"
                    );
                    match self.store.remove(id).await {
                        Ok(true) => report.removed.push(id.to_string()),
                        Ok(false) => debug!(recipient = %id, "Subscriber already gone"),
                        Err(store_err) => {
                            error!(
                                recipient = %id,
                                error = %store_err,
                                "Failed to remove subscriber"
                            )
                        }
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        recipient = %id,
                        attempts = outcome.attempts,
                        error = %e,
                        "Delivery failed after retries"
                    );
                }
            }
        }

        info!(
            success = report.success,
            failed = report.failed,
            removed = report.removed.len(),
            "Broadcast finished"
        );
        report
    }
}
