//! State store capability.
//!
//! Handlers only see [`StateStore`]; the concrete backend is chosen once at
//! startup by [`connect`] and shared as `Arc<dyn StateStore>`.

use std::sync::Arc;

use async_trait::async_trait;
use configs::{StoreBackend, StoreConfig};
use tracing::info;

use crate::errors::StoreError;

pub mod dapr;
pub mod file;
pub mod memory;

pub use dapr::DaprStateStore;
pub use file::FileStateStore;
pub use memory::MemoryStateStore;

/// One write in a save request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateItem {
    pub key: String,
    pub value: Vec<u8>,
    pub etag: Option<String>,
}

impl StateItem {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into(), value: value.into(), etag: None }
    }
}

/// Result of a successful read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateEntry {
    pub value: Vec<u8>,
    pub etag: Option<String>,
}

impl StateEntry {
    /// Value as text; invalid UTF-8 is replaced rather than rejected.
    pub fn value_lossy(&self) -> String {
        String::from_utf8_lossy(&self.value).into_owned()
    }

    /// Version token, empty when the store did not supply one.
    pub fn etag_or_empty(&self) -> String {
        self.etag.clone().unwrap_or_default()
    }
}

/// Key/value capability provided by the external state store.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Backend label used in logs.
    fn name(&self) -> &'static str;

    /// Read `key` from `store_name`. Absence is `StoreError::NotFound`.
    async fn get(&self, store_name: &str, key: &str) -> Result<StateEntry, StoreError>;

    /// Write all `items` to `store_name`.
    async fn save(&self, store_name: &str, items: Vec<StateItem>) -> Result<(), StoreError>;

    /// Release client resources. Idempotent; later calls fail with `Closed`.
    async fn close(&self);
}

/// Build the configured backend. Errors here are fatal at startup.
pub async fn connect(cfg: &StoreConfig) -> Result<Arc<dyn StateStore>, StoreError> {
    let store: Arc<dyn StateStore> = match cfg.backend {
        StoreBackend::Dapr => Arc::new(DaprStateStore::connect(cfg).await?),
        StoreBackend::Memory => Arc::new(MemoryStateStore::new()),
        StoreBackend::File => Arc::new(FileStateStore::open(&cfg.file_path).await?),
    };
    info!(backend = store.name(), "state store client ready");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_helpers() {
        let e = StateEntry { value: b"hi".to_vec(), etag: None };
        assert_eq!(e.value_lossy(), "hi");
        assert_eq!(e.etag_or_empty(), "");
        let e = StateEntry { value: vec![0xff, b'a'], etag: Some("7".into()) };
        assert_eq!(e.value_lossy(), "\u{fffd}a");
        assert_eq!(e.etag_or_empty(), "7");
    }

    #[tokio::test]
    async fn connect_memory_backend() -> Result<(), anyhow::Error> {
        let cfg = StoreConfig { backend: StoreBackend::Memory, ..StoreConfig::default() };
        let store = connect(&cfg).await?;
        assert_eq!(store.name(), "memory");
        store.save("s", vec![StateItem::new("k", "v")]).await?;
        assert_eq!(store.get("s", "k").await?.value, b"v");
        Ok(())
    }

    #[tokio::test]
    async fn connect_dapr_fails_without_sidecar() {
        // Grab a free port and release it so nothing is listening there.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .and_then(|l| l.local_addr())
            .map(|a| a.port())
            .expect("free port");
        let cfg = StoreConfig {
            backend: StoreBackend::Dapr,
            dapr_http_port: Some(port),
            timeout_ms: 200,
            connect_retries: 1,
            connect_backoff_ms: 1,
            ..StoreConfig::default()
        };
        let err = connect(&cfg).await.err().expect("connect must fail");
        assert!(matches!(err, StoreError::Transport(_)), "unexpected error: {err}");
    }
}
