//! Collaborator interfaces: case lookup and raw byte fetch.
//!
//! Everything outside the field-resolution-and-overlay core — HTTP routes,
//! upload handling, on-disk persistence — talks to this core through two
//! small traits. The core never decides where bytes live; strategies and
//! the renderer only ask a [`FileStore`] for a path and get bytes or a
//! [`FetchError`] back.
//!
//! In-memory implementations ship for tests; [`HttpFileStore`] covers
//! deployments that serve uploads and static assets over HTTP.

use crate::error::FetchError;
use crate::resolve::ProcessRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Case record lookup. `None` degrades the render (blank form) rather than
/// failing it.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_record(&self, case_id: &str) -> Option<ProcessRecord>;
}

/// Resolves a relative storage path or URI to raw bytes.
///
/// Used for uploaded complete documents and for signature strategies 1, 3,
/// and 5. Implementations should be cheap to call concurrently.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn fetch_bytes(&self, path: &str) -> Result<Vec<u8>, FetchError>;
}

/// In-memory record store for tests and previews.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: HashMap<String, ProcessRecord>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, case_id: impl Into<String>, record: ProcessRecord) {
        self.records.insert(case_id.into(), record);
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get_record(&self, case_id: &str) -> Option<ProcessRecord> {
        self.records.get(case_id).cloned()
    }
}

/// In-memory file store for tests.
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, bytes: Vec<u8>) {
        self.files.insert(path.into(), bytes);
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn fetch_bytes(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                path: path.to_string(),
            })
    }
}

/// File store backed by an HTTP origin (uploads bucket, static assets).
///
/// Relative paths are joined onto `base_url`; absolute `http(s)://` paths
/// are fetched as-is. Every request carries a hard timeout so a slow
/// origin degrades to a [`FetchError`] instead of stalling a render.
pub struct HttpFileStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFileStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let base_url = base_url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Http {
                path: base_url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self { client, base_url })
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                path.trim_start_matches('/')
            )
        }
    }
}

#[async_trait]
impl FileStore for HttpFileStore {
    async fn fetch_bytes(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let url = self.url_for(path);
        debug!(%url, "fetching bytes over HTTP");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Http {
                path: url.clone(),
                reason: e.to_string(),
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound { path: url });
        }
        if !response.status().is_success() {
            return Err(FetchError::Http {
                path: url,
                reason: format!("HTTP {}", response.status()),
            });
        }

        let bytes = response.bytes().await.map_err(|e| FetchError::Http {
            path: url,
            reason: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_record_store_round_trip() {
        let mut store = MemoryRecordStore::new();
        store.insert("Caso-1", ProcessRecord::new(json!({"a": 1})));
        assert!(store.get_record("Caso-1").await.is_some());
        assert!(store.get_record("Caso-2").await.is_none());
    }

    #[tokio::test]
    async fn memory_file_store_misses_are_not_found() {
        let mut store = MemoryFileStore::new();
        store.insert("uploads/sig.png", vec![1, 2, 3]);
        assert_eq!(
            store.fetch_bytes("uploads/sig.png").await.unwrap(),
            vec![1, 2, 3]
        );
        assert!(matches!(
            store.fetch_bytes("missing").await,
            Err(FetchError::NotFound { .. })
        ));
    }

    #[test]
    fn http_store_joins_relative_paths_once() {
        let store =
            HttpFileStore::new("https://files.example.pt/", Duration::from_secs(2)).unwrap();
        assert_eq!(
            store.url_for("/uploads/sig.png"),
            "https://files.example.pt/uploads/sig.png"
        );
        assert_eq!(
            store.url_for("https://cdn.example.pt/x.png"),
            "https://cdn.example.pt/x.png"
        );
    }
}
