use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{StateEntry, StateItem, StateStore};
use crate::errors::StoreError;
use crate::storage::json_map_store::JsonMapStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredValue {
    value: String,
    version: u64,
}

/// Dev backend persisting every record to one JSON file.
///
/// Map keys are `"{store}||{key}"` because JSON object keys must be strings.
pub struct FileStateStore {
    map: JsonMapStore<String, StoredValue>,
    closed: AtomicBool,
}

fn slot(store_name: &str, key: &str) -> String {
    format!("{store_name}||{key}")
}

impl FileStateStore {
    pub async fn open<P: Into<PathBuf>>(path: P) -> Result<Self, StoreError> {
        let map = JsonMapStore::open(path).await?;
        debug!(path = %map.path().display(), "file state store opened");
        Ok(Self { map, closed: AtomicBool::new(false) })
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get(&self, store_name: &str, key: &str) -> Result<StateEntry, StoreError> {
        self.ensure_open()?;
        match self.map.get(&slot(store_name, key)).await {
            Some(stored) => Ok(StateEntry {
                value: stored.value.into_bytes(),
                etag: Some(stored.version.to_string()),
            }),
            None => Err(StoreError::not_found(store_name, key)),
        }
    }

    async fn save(&self, store_name: &str, items: Vec<StateItem>) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.map
            .update_map(|m| {
                for item in items {
                    let slot = slot(store_name, &item.key);
                    let version = m.get(&slot).map(|s| s.version + 1).unwrap_or(1);
                    let value = String::from_utf8_lossy(&item.value).into_owned();
                    m.insert(slot, StoredValue { value, version });
                }
            })
            .await
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_store_survives_reopen() -> Result<(), anyhow::Error> {
        let tmp = std::env::temp_dir().join(format!("file_state_{}.json", uuid::Uuid::new_v4()));
        let store = FileStateStore::open(&tmp).await?;
        assert!(store.get("s", "k").await.unwrap_err().is_not_found());

        store.save("s", vec![StateItem::new("k", "first")]).await?;
        store.save("s", vec![StateItem::new("k", "second")]).await?;
        store.close().await;
        assert!(matches!(store.get("s", "k").await, Err(StoreError::Closed)));

        let reopened = FileStateStore::open(&tmp).await?;
        let entry = reopened.get("s", "k").await?;
        assert_eq!(entry.value_lossy(), "second");
        assert_eq!(entry.etag.as_deref(), Some("2"));

        let _ = tokio::fs::remove_file(&tmp).await;
        Ok(())
    }
}
