//! Client for the Dapr sidecar state API (`/v1.0/state`).

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use configs::StoreConfig;
use reqwest::{header::ETAG, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{StateEntry, StateItem, StateStore};
use crate::errors::StoreError;

const API_TOKEN_HEADER: &str = "dapr-api-token";

/// Error envelope returned by the sidecar on non-2xx responses.
#[derive(Debug, Deserialize)]
struct SidecarError {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct SaveItem<'a> {
    key: &'a str,
    value: Cow<'a, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    etag: Option<&'a str>,
}

pub struct DaprStateStore {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
    closed: AtomicBool,
}

impl DaprStateStore {
    /// Build a client for the sidecar at `base_url` (e.g. `http://127.0.0.1:3500`).
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        api_token: Option<String>,
    ) -> Result<Self, StoreError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url)
            .map_err(|e| StoreError::InvalidConfig(format!("sidecar url `{base_url}`: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::InvalidConfig(e.to_string()))?;
        Ok(Self { client, base_url, api_token, closed: AtomicBool::new(false) })
    }

    /// Build the client from configuration and, if enabled, wait for the sidecar.
    pub async fn connect(cfg: &StoreConfig) -> Result<Self, StoreError> {
        let api_token = std::env::var("DAPR_API_TOKEN").ok().filter(|t| !t.is_empty());
        let store = Self::new(cfg.dapr_base_url(), cfg.timeout(), api_token)?;
        if cfg.probe_on_connect {
            store.wait_for_sidecar(cfg.connect_retries.max(1), cfg.connect_backoff()).await?;
        }
        info!(endpoint = %store.base_url, "dapr sidecar client configured");
        Ok(store)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe the sidecar health endpoint until it answers 2xx or attempts run out.
    pub async fn wait_for_sidecar(
        &self,
        attempts: u32,
        backoff: Duration,
    ) -> Result<(), StoreError> {
        let url = format!("{}/v1.0/healthz/outbound", self.base_url);
        let mut last_err = StoreError::Transport("sidecar not probed".into());
        for attempt in 1..=attempts {
            match self.request(Method::GET, &url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => last_err = rejected(resp).await,
                Err(e) => last_err = e.into(),
            }
            warn!(attempt, attempts, error = %last_err, "dapr sidecar not ready");
            if attempt < attempts {
                tokio::time::sleep(backoff).await;
            }
        }
        Err(last_err)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_token {
            Some(token) => builder.header(API_TOKEN_HEADER, token),
            None => builder,
        }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

/// Turn a non-2xx sidecar response into `StoreError::Rejected`.
async fn rejected(resp: Response) -> StoreError {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    let parsed = serde_json::from_str::<SidecarError>(&text).ok();
    if let Some(code) = parsed.as_ref().and_then(|e| e.error_code.as_deref()) {
        debug!(status = status.as_u16(), error_code = code, "sidecar error");
    }
    let message = parsed
        .and_then(|e| e.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                trimmed.to_string()
            }
        });
    StoreError::Rejected { status: status.as_u16(), message }
}

/// Values saved as JSON strings come back quoted; unwrap them, keep anything else verbatim.
fn decode_value(body: &[u8]) -> Vec<u8> {
    match serde_json::from_slice::<String>(body) {
        Ok(text) => text.into_bytes(),
        Err(_) => body.to_vec(),
    }
}

#[async_trait]
impl StateStore for DaprStateStore {
    fn name(&self) -> &'static str {
        "dapr"
    }

    async fn get(&self, store_name: &str, key: &str) -> Result<StateEntry, StoreError> {
        self.ensure_open()?;
        let url = format!("{}/v1.0/state/{}/{}", self.base_url, store_name, key);
        debug!(store = store_name, key, "dapr get state");
        let resp = self.request(Method::GET, &url).send().await?;
        let status = resp.status();
        if status == StatusCode::NO_CONTENT {
            return Err(StoreError::not_found(store_name, key));
        }
        if !status.is_success() {
            return Err(rejected(resp).await);
        }
        let etag = resp
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.bytes().await?;
        if body.is_empty() {
            return Err(StoreError::not_found(store_name, key));
        }
        Ok(StateEntry { value: decode_value(&body), etag })
    }

    async fn save(&self, store_name: &str, items: Vec<StateItem>) -> Result<(), StoreError> {
        self.ensure_open()?;
        let url = format!("{}/v1.0/state/{}", self.base_url, store_name);
        let payload: Vec<SaveItem<'_>> = items
            .iter()
            .map(|item| SaveItem {
                key: &item.key,
                value: String::from_utf8_lossy(&item.value),
                etag: item.etag.as_deref(),
            })
            .collect();
        debug!(store = store_name, items = payload.len(), "dapr save state");
        let resp = self.request(Method::POST, &url).json(&payload).send().await?;
        if !resp.status().is_success() {
            return Err(rejected(resp).await);
        }
        Ok(())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(endpoint = %self.base_url, "dapr client closed");
        }
    }
}
