//! Dispatch Core - signal evaluation and subscriber fan-out.
//!
//! This crate provides:
//! - A scheduled orchestrator that evaluates a symbol universe against
//!   pluggable signal sources
//! - An operating-hours gate in a fixed reference time zone
//! - A rate-limit circuit breaker with a self-resetting cooldown
//! - Per-symbol duplicate suppression
//! - Retrying broadcast fan-out that prunes unreachable subscribers
//! - Memory, JSON file and Redis persistence for subscribers and dedup records
//! - HTTP analyzer and Telegram clients, plus the chat command surface

pub mod broadcast;
pub mod circuit_breaker;
pub mod clients;
pub mod clock;
pub mod commands;
pub mod dedup;
pub mod error;
pub mod formatters;
pub mod hours;
pub mod models;
pub mod orchestrator;
pub mod retry;
pub mod store;

pub use broadcast::{BroadcastReport, Broadcaster};
pub use circuit_breaker::{BreakerConfig, BreakerDecision, BreakerStatus, CircuitBreaker};
pub use commands::{Command, CommandHandler, Requester};
pub use dedup::DuplicateSuppressor;
pub use error::{DeliveryError, SourceError, StoreError};
pub use hours::OperatingWindow;
pub use models::{Direction, Signal, Subscriber};
pub use orchestrator::{CycleOutcome, Orchestrator, OrchestratorConfig, PacingConfig};
pub use retry::RetryPolicy;
