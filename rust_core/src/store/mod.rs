//! Persistence collaborators for subscribers and dedup timestamps.
//!
//! Both stores are shared between the scheduled cycle and command handlers
//! without any transactional isolation: callers do plain reads and writes and
//! the last writer wins.

pub mod file;
pub mod memory;
pub mod redis;

use crate::error::StoreError;
use crate::models::Subscriber;
use async_trait::async_trait;

pub use self::file::{JsonFileDedupStore, JsonFileSubscriberStore};
pub use self::memory::{MemoryDedupStore, MemorySubscriberStore};
pub use self::redis::{RedisDedupStore, RedisSubscriberStore};

#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Current subscribers in the store's enumeration order
    async fn list_all(&self) -> Result<Vec<Subscriber>, StoreError>;

    /// Insert or overwrite the record for `subscriber.id`
    async fn add(&self, subscriber: Subscriber) -> Result<(), StoreError>;

    /// Remove a subscriber; returns whether a record existed
    async fn remove(&self, id: &str) -> Result<bool, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;
}

#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Last-sent epoch seconds for an (already uppercased) symbol
    async fn get(&self, symbol: &str) -> Result<Option<i64>, StoreError>;

    async fn set(&self, symbol: &str, epoch: i64) -> Result<(), StoreError>;
}
