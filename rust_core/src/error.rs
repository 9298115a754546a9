//! Error taxonomy for the dispatch core.
//!
//! Each collaborator boundary has its own error type so callers can classify
//! failures without string matching:
//! - [`SourceError`] for signal source calls (rate-limit vs other)
//! - [`DeliveryError`] for transport sends (terminal vs transient)
//! - [`StoreError`] for persistence reads and writes

use thiserror::Error;

/// HTTP statuses an upstream analyzer uses to signal throttling or a ban.
pub const RATE_LIMIT_STATUSES: [u16; 2] = [429, 418];

/// HTTP statuses a messaging API uses when the recipient is gone for good.
pub const TERMINAL_DELIVERY_STATUSES: [u16; 2] = [403, 410];

/// Failure of a signal source call
#[derive(Debug, Error)]
pub enum SourceError {
    /// Upstream is throttling or has banned us (429/418-equivalent)
    #[error("rate limited by {source_name} (status {status})")]
    RateLimited { source_name: String, status: u16 },
    /// Any other analysis failure
    #[error("analysis failed: {0}")]
    Other(String),
}

impl SourceError {
    /// Build an error from an upstream HTTP status, classifying throttling codes.
    pub fn from_status(source_name: &str, status: u16, body: &str) -> Self {
        if RATE_LIMIT_STATUSES.contains(&status) {
            SourceError::RateLimited {
                source_name: source_name.to_string(),
                status,
            }
        } else {
            SourceError::Other(format!("{source_name} returned {status}: {body}"))
        }
    }

    /// Classify a free-form failure message by any throttling code it embeds.
    ///
    /// Analyzers that wrap an exchange error often only surface the
    /// exchange's status inside their own error text.
    pub fn from_message(source_name: &str, message: &str) -> Self {
        let embedded = RATE_LIMIT_STATUSES
            .iter()
            .find(|code| message.contains(&code.to_string()));
        match embedded {
            Some(&status) => SourceError::RateLimited {
                source_name: source_name.to_string(),
                status,
            },
            None => SourceError::Other(format!("{source_name}: {message}")),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SourceError::RateLimited { .. })
    }
}

/// Failure of a single delivery attempt
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Recipient blocked or removed the bot; never retry
    #[error("recipient {recipient} unreachable (status {status})")]
    Terminal { recipient: String, status: u16 },
    /// Network, timeout, server error or anything else worth retrying
    #[error("transient delivery failure: {0}")]
    Transient(String),
}

impl DeliveryError {
    /// Build an error from a messaging API status.
    pub fn from_status(recipient: &str, status: u16, body: &str) -> Self {
        if TERMINAL_DELIVERY_STATUSES.contains(&status) {
            DeliveryError::Terminal {
                recipient: recipient.to_string(),
                status,
            }
        } else {
            DeliveryError::Transient(format!("status {status}: {body}"))
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryError::Terminal { .. })
    }
}

/// Persistence failure from a subscriber or dedup store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}
