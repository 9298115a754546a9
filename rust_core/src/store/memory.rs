//! In-process stores. Insertion-ordered subscribers, hash-mapped dedup.

use super::{DedupStore, SubscriberStore};
use crate::error::StoreError;
use crate::models::Subscriber;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MemorySubscriberStore {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl MemorySubscriberStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscribers(subscribers: impl IntoIterator<Item = Subscriber>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.subscribers.write();
            for sub in subscribers {
                upsert(&mut inner, sub);
            }
        }
        store
    }

    pub fn contains(&self, id: &str) -> bool {
        self.subscribers.read().iter().any(|s| s.id == id)
    }
}

fn upsert(subscribers: &mut Vec<Subscriber>, subscriber: Subscriber) {
    match subscribers.iter_mut().find(|s| s.id == subscriber.id) {
        Some(existing) => *existing = subscriber,
        None => subscribers.push(subscriber),
    }
}

#[async_trait]
impl SubscriberStore for MemorySubscriberStore {
    async fn list_all(&self) -> Result<Vec<Subscriber>, StoreError> {
        Ok(self.subscribers.read().clone())
    }

    async fn add(&self, subscriber: Subscriber) -> Result<(), StoreError> {
        upsert(&mut self.subscribers.write(), subscriber);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        Ok(subscribers.len() != before)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.subscribers.read().len())
    }
}

#[derive(Debug, Default)]
pub struct MemoryDedupStore {
    records: RwLock<HashMap<String, i64>>,
}

impl MemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn get(&self, symbol: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.records.read().get(symbol).copied())
    }

    async fn set(&self, symbol: &str, epoch: i64) -> Result<(), StoreError> {
        self.records.write().insert(symbol.to_string(), epoch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_is_idempotent_overwrite() {
        let store = MemorySubscriberStore::new();
        store.add(Subscriber::new("1")).await.unwrap();
        store.add(Subscriber::new("2")).await.unwrap();

        let mut renamed = Subscriber::new("1");
        renamed.display_name = Some("Alice".to_string());
        store.add(renamed).await.unwrap();

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "1");
        assert_eq!(all[0].display_name.as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn test_remove_reports_presence() {
        let store = MemorySubscriberStore::with_subscribers([Subscriber::new("1")]);
        assert!(store.remove("1").await.unwrap());
        assert!(!store.remove("1").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dedup_overwrites() {
        let store = MemoryDedupStore::new();
        assert_eq!(store.get("BTCUSDT").await.unwrap(), None);
        store.set("BTCUSDT", 100).await.unwrap();
        store.set("BTCUSDT", 200).await.unwrap();
        assert_eq!(store.get("BTCUSDT").await.unwrap(), Some(200));
        assert_eq!(store.len(), 1);
    }
}
