//! Key-value record store clients.
//!
//! The DNS subsystem only issues writes, deletes and point reads; the store
//! is the source of truth for every record.

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::{StoreConfig, StoreKind};
use crate::error::StoreError;

/// Per-write options.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    /// Expire the key itself after this many seconds. Enforced by the store.
    pub ttl: Option<u64>,
}

/// Hierarchical key-value store holding DNS records.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Create or overwrite `key`.
    async fn set(&self, key: &str, value: &str, opts: SetOptions) -> Result<(), StoreError>;

    /// Remove `key`. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Read `key`, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
}

/// Build the store selected by `config`.
pub fn from_config(config: &StoreConfig) -> Result<Arc<dyn KvStore>, StoreError> {
    match config.kind {
        StoreKind::Etcd => Ok(Arc::new(EtcdStore::new(
            &config.endpoint,
            Duration::from_millis(config.timeout_ms),
        )?)),
        StoreKind::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}

/// etcd v2 keys API client.
#[derive(Debug, Clone)]
pub struct EtcdStore {
    http: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct EtcdResponse {
    node: EtcdNode,
}

#[derive(Debug, Deserialize)]
struct EtcdNode {
    #[serde(default)]
    value: Option<String>,
}

impl EtcdStore {
    /// Create a client for the etcd member at `endpoint` (e.g. `http://127.0.0.1:2379`).
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, key: &str) -> String {
        format!("{}/v2/keys/{}", self.endpoint, key.trim_start_matches('/'))
    }

    /// Unreachable or slow members become [`StoreError::Unavailable`].
    fn transport(e: reqwest::Error) -> StoreError {
        if e.is_connect() || e.is_timeout() {
            StoreError::Unavailable(e.to_string())
        } else {
            StoreError::Http(e)
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl KvStore for EtcdStore {
    async fn set(&self, key: &str, value: &str, opts: SetOptions) -> Result<(), StoreError> {
        let mut form = vec![("value", value.to_string())];
        if let Some(ttl) = opts.ttl {
            form.push(("ttl", ttl.to_string()));
        }

        trace!(key, "etcd set");
        let response = self
            .http
            .put(self.url(key))
            .form(&form)
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        trace!(key, "etcd delete");
        let response = self
            .http
            .delete(self.url(key))
            .send()
            .await
            .map_err(Self::transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(key, "delete of missing key");
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let response = self.http.get(self.url(key)).send().await.map_err(Self::transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(response).await?;
        let body: EtcdResponse = response.json().await?;
        Ok(body.node.value)
    }
}

/// In-process store. TTLs are accepted and ignored.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all keys currently stored.
    pub fn keys(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn set(&self, key: &str, value: &str, _opts: SetOptions) -> Result<(), StoreError> {
        self.inner.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.write().remove(key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.read().get(key).cloned())
    }
}
