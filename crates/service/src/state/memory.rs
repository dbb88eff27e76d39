use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{StateEntry, StateItem, StateStore};
use crate::errors::StoreError;

/// Process-local store keyed by `(store_name, key)`.
///
/// Every write gets a fresh version from a global counter, rendered as the etag.
#[derive(Default)]
pub struct MemoryStateStore {
    entries: DashMap<(String, String), (Vec<u8>, u64)>,
    version: AtomicU64,
    closed: AtomicBool,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, store_name: &str, key: &str) -> Result<StateEntry, StoreError> {
        self.ensure_open()?;
        let slot = (store_name.to_string(), key.to_string());
        match self.entries.get(&slot) {
            Some(entry) => {
                let (value, version) = entry.value();
                Ok(StateEntry { value: value.clone(), etag: Some(version.to_string()) })
            }
            None => Err(StoreError::not_found(store_name, key)),
        }
    }

    async fn save(&self, store_name: &str, items: Vec<StateItem>) -> Result<(), StoreError> {
        self.ensure_open()?;
        for item in items {
            let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
            self.entries.insert((store_name.to_string(), item.key), (item.value, version));
        }
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = MemoryStateStore::new();
        let err = store.get("s", "k").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn last_write_wins_and_version_advances() -> Result<(), anyhow::Error> {
        let store = MemoryStateStore::new();
        store.save("s", vec![StateItem::new("k", "one")]).await?;
        let first = store.get("s", "k").await?;
        store.save("s", vec![StateItem::new("k", "two")]).await?;
        let second = store.get("s", "k").await?;

        assert_eq!(second.value, b"two");
        assert_ne!(first.etag, second.etag);
        assert_eq!(store.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn stores_are_namespaced() -> Result<(), anyhow::Error> {
        let store = MemoryStateStore::new();
        store.save("a", vec![StateItem::new("k", "in-a")]).await?;
        assert!(store.get("b", "k").await.unwrap_err().is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn closed_store_rejects_calls() {
        let store = MemoryStateStore::new();
        store.close().await;
        store.close().await;
        assert!(matches!(store.get("s", "k").await, Err(StoreError::Closed)));
        assert!(matches!(
            store.save("s", vec![StateItem::new("k", "v")]).await,
            Err(StoreError::Closed)
        ));
    }
}
