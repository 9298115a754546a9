//! Redis-backed stores.
//!
//! Subscribers live in a hash of `id -> JSON record`, dedup timestamps in a
//! hash of `SYMBOL -> epoch`.

use super::{DedupStore, SubscriberStore};
use crate::error::StoreError;
use crate::models::Subscriber;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use tracing::warn;

pub const SUBSCRIBERS_KEY: &str = "dispatch:subscribers";
pub const LAST_SIGNALS_KEY: &str = "dispatch:last_signals";

/// Open a managed connection that reconnects on its own
pub async fn connect(redis_url: &str) -> Result<ConnectionManager, StoreError> {
    let client = Client::open(redis_url)?;
    Ok(ConnectionManager::new(client).await?)
}

/// Readable records from a subscriber hash, oldest first
fn decode_subscribers(raw: HashMap<String, String>) -> Vec<Subscriber> {
    let mut subscribers: Vec<Subscriber> = raw
        .into_iter()
        .filter_map(|(id, payload)| match serde_json::from_str(&payload) {
            Ok(sub) => Some(sub),
            Err(e) => {
                warn!(id = %id, error = %e, "Skipping unreadable subscriber record");
                None
            }
        })
        .collect();
    subscribers.sort_by(|a, b| a.added_at.cmp(&b.added_at).then_with(|| a.id.cmp(&b.id)));
    subscribers
}

#[derive(Clone)]
pub struct RedisSubscriberStore {
    connection: ConnectionManager,
    key: String,
}

impl RedisSubscriberStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self::with_key(connection, SUBSCRIBERS_KEY)
    }

    pub fn with_key(connection: ConnectionManager, key: &str) -> Self {
        Self {
            connection,
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl SubscriberStore for RedisSubscriberStore {
    async fn list_all(&self) -> Result<Vec<Subscriber>, StoreError> {
        let mut conn = self.connection.clone();
        let raw: HashMap<String, String> = conn.hgetall(&self.key).await?;
        Ok(decode_subscribers(raw))
    }

    async fn add(&self, subscriber: Subscriber) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&subscriber)?;
        let mut conn = self.connection.clone();
        conn.hset::<_, _, _, ()>(&self.key, &subscriber.id, payload)
            .await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        let removed: i64 = conn.hdel(&self.key, id).await?;
        Ok(removed > 0)
    }

    /// Counts what `list_all` would return, so unreadable records are excluded
    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.list_all().await?.len())
    }
}

#[derive(Clone)]
pub struct RedisDedupStore {
    connection: ConnectionManager,
    key: String,
}

impl RedisDedupStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self::with_key(connection, LAST_SIGNALS_KEY)
    }

    pub fn with_key(connection: ConnectionManager, key: &str) -> Self {
        Self {
            connection,
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl DedupStore for RedisDedupStore {
    async fn get(&self, symbol: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.connection.clone();
        Ok(conn.hget(&self.key, symbol).await?)
    }

    async fn set(&self, symbol: &str, epoch: i64) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        conn.hset::<_, _, _, ()>(&self.key, symbol, epoch).await?;
        Ok(())
    }
}
