//! JSON file stores.
//!
//! On-disk shape:
//! - subscribers: `{ "<id>": { "id": ..., "display_name": ..., ... } }`
//! - dedup: `{ "BTCUSDT": 1700000000 }`
//!
//! Every call re-reads the file under the store's lock. Mutations rewrite the
//! whole file through a sibling temp file and a rename, so a reader never sees
//! a half-written object. Two handles on the same path do not share a lock.

use super::{DedupStore, SubscriberStore};
use crate::error::StoreError;
use crate::models::Subscriber;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// Read a JSON object from `path`, creating the file with `{}` if missing.
async fn load_map<V: DeserializeOwned>(path: &Path) -> Result<BTreeMap<String, V>, StoreError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            tokio::fs::write(path, "{}").await?;
            debug!(path = %path.display(), "Created empty store file");
            return Ok(BTreeMap::new());
        }
        Err(e) => return Err(e.into()),
    };

    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    Ok(serde_json::from_str(&raw)?)
}

/// Replace `path` with `map` in one step.
async fn save_map<V: Serialize>(path: &Path, map: &BTreeMap<String, V>) -> Result<(), StoreError> {
    let payload = serde_json::to_string_pretty(map)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, payload).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[derive(Debug)]
pub struct JsonFileSubscriberStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileSubscriberStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl SubscriberStore for JsonFileSubscriberStore {
    async fn list_all(&self) -> Result<Vec<Subscriber>, StoreError> {
        let _guard = self.lock.lock().await;
        let map: BTreeMap<String, Subscriber> = load_map(&self.path).await?;
        // The key is the chat id; the record's own id may be a user id
        Ok(map
            .into_iter()
            .map(|(id, mut sub)| {
                sub.id = id;
                sub
            })
            .collect())
    }

    async fn add(&self, subscriber: Subscriber) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut map: BTreeMap<String, Subscriber> = load_map(&self.path).await?;
        map.insert(subscriber.id.clone(), subscriber);
        save_map(&self.path, &map).await
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let mut map: BTreeMap<String, Subscriber> = load_map(&self.path).await?;
        if map.remove(id).is_none() {
            return Ok(false);
        }
        save_map(&self.path, &map).await?;
        Ok(true)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().await;
        let map: BTreeMap<String, Subscriber> = load_map(&self.path).await?;
        Ok(map.len())
    }
}

#[derive(Debug)]
pub struct JsonFileDedupStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileDedupStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl DedupStore for JsonFileDedupStore {
    async fn get(&self, symbol: &str) -> Result<Option<i64>, StoreError> {
        let _guard = self.lock.lock().await;
        let map: BTreeMap<String, i64> = load_map(&self.path).await?;
        Ok(map.get(symbol).copied())
    }

    async fn set(&self, symbol: &str, epoch: i64) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut map: BTreeMap<String, i64> = load_map(&self.path).await?;
        map.insert(symbol.to_string(), epoch);
        save_map(&self.path, &map).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use uuid::Uuid;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("dispatch-store-{}", Uuid::new_v4()))
            .join(name)
    }

    #[tokio::test]
    async fn test_missing_file_is_created_empty() {
        let path = temp_path("users.json");
        let store = JsonFileSubscriberStore::new(&path);

        assert_eq!(store.count().await.unwrap(), 0);
        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(raw, "{}");
    }

    #[tokio::test]
    async fn test_subscriber_roundtrip_through_disk() {
        let path = temp_path("users.json");
        let store = JsonFileSubscriberStore::new(&path);

        let mut sub = Subscriber::new("12345");
        sub.username = Some("trader".to_string());
        store.add(sub.clone()).await.unwrap();

        // A fresh handle sees what the first one wrote
        let reopened = JsonFileSubscriberStore::new(&path);
        let all = reopened.list_all().await.unwrap();
        assert_eq!(all, vec![sub]);

        assert!(reopened.remove("12345").await.unwrap());
        assert!(!reopened.remove("12345").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reads_legacy_users_file() {
        let path = temp_path("users.json");
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(
            &path,
            r#"{"-100200": {"id": 777, "username": "lan", "first_name": "Lan", "addedAt": "2024-05-01T10:00:00.000Z"}}"#,
        )
        .await
        .unwrap();

        let store = JsonFileSubscriberStore::new(&path);
        let all = store.list_all().await.unwrap();

        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "-100200");
        assert_eq!(all[0].username.as_deref(), Some("lan"));
    }

    #[tokio::test]
    async fn test_dedup_file_layout() {
        let path = temp_path("last_signals.json");
        let store = JsonFileDedupStore::new(&path);

        store.set("ETHUSDT", 1_700_000_000).await.unwrap();
        assert_eq!(store.get("ETHUSDT").await.unwrap(), Some(1_700_000_000));
        assert_eq!(store.get("BTCUSDT").await.unwrap(), None);

        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["ETHUSDT"], 1_700_000_000);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let path = temp_path("last_signals.json");
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, "{not json").await.unwrap();

        let store = JsonFileDedupStore::new(&path);
        assert!(matches!(store.get("BTCUSDT").await, Err(StoreError::Serde(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_prune_and_subscribe_keep_every_record() {
        let path = temp_path("users.json");
        let store = Arc::new(JsonFileSubscriberStore::new(&path));
        for i in 0..300 {
            store.add(Subscriber::new(i.to_string())).await.unwrap();
        }

        let pruner = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 0..50 {
                    assert!(store.remove(&i.to_string()).await.unwrap());
                }
            })
        };
        let joiner = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 1000..1050 {
                    store.add(Subscriber::new(i.to_string())).await.unwrap();
                }
            })
        };
        let reader = {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    assert!(store.count().await.unwrap() >= 250);
                }
            })
        };

        pruner.await.unwrap();
        joiner.await.unwrap();
        reader.await.unwrap();

        assert_eq!(store.count().await.unwrap(), 300);
        let reopened = JsonFileSubscriberStore::new(&path);
        let ids: Vec<String> = reopened
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert!(!ids.contains(&"0".to_string()));
        assert!(ids.contains(&"1049".to_string()));
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_file() {
        let path = temp_path("last_signals.json");
        let store = JsonFileDedupStore::new(&path);
        store.set("BTCUSDT", 1_700_000_000).await.unwrap();

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        assert!(!PathBuf::from(tmp).exists());
        assert!(path.exists());
    }
}
