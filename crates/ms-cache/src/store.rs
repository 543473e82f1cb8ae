//! Persistence layer
//!
//! A key-value trait over the host's storage area, an in-memory provider,
//! and the cache store adapter that owns the persisted record shape:
//! `{ filterBytes, urls, metadata }` as camelCase JSON with the filter bytes
//! base64-encoded for text-safe transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ms_core::CacheMetadata;

/// Storage key under which the cache record lives.
pub const RECORD_KEY: &str = "bookmarkCache";

/// Error type for key-value storage.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The persistence area is full. The write failed; whatever record was
    /// persisted before is untouched.
    #[error("storage quota exceeded")]
    QuotaExceeded,
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// The host's persistent key-value area.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    /// Atomic at the key level: either the old or the new value survives.
    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
    /// Byte-usage introspection for status reporting.
    async fn bytes_in_use(&self) -> Result<u64, StoreError>;
}

/// Persisted record shape.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheRecord {
    filter_bytes: String,
    urls: Vec<String>,
    metadata: CacheMetadata,
}

/// A structurally valid record as loaded from storage. Version and age
/// gates are the manager's concern, not the adapter's.
#[derive(Debug)]
pub struct LoadedCache {
    pub filter_bytes: Vec<u8>,
    pub urls: Vec<String>,
    pub metadata: CacheMetadata,
}

/// Load/save of the serialized filter plus the exact URL set and metadata.
pub struct CacheStoreAdapter {
    store: Arc<dyn KeyValueStore>,
}

impl CacheStoreAdapter {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn save(
        &self,
        filter_bytes: &[u8],
        urls: Vec<String>,
        metadata: CacheMetadata,
    ) -> Result<(), StoreError> {
        let record = CacheRecord {
            filter_bytes: B64.encode(filter_bytes),
            urls,
            metadata,
        };
        let value =
            serde_json::to_string(&record).map_err(|err| StoreError::Backend(err.to_string()))?;
        self.store.set(RECORD_KEY, value).await
    }

    /// Load the persisted record.
    ///
    /// `None` covers both "never saved" and "structurally invalid": an
    /// unparseable or undecodable record is logged and treated as absent,
    /// never surfaced as an error. Only backend failures error.
    pub async fn load(&self) -> Result<Option<LoadedCache>, StoreError> {
        let value = match self.store.get(RECORD_KEY).await? {
            Some(value) => value,
            None => return Ok(None),
        };

        let record: CacheRecord = match serde_json::from_str(&value) {
            Ok(record) => record,
            Err(err) => {
                log::warn!("discarding unparseable cache record: {err}");
                return Ok(None);
            }
        };

        let filter_bytes = match B64.decode(record.filter_bytes.as_bytes()) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("discarding cache record with invalid filter encoding: {err}");
                return Ok(None);
            }
        };
        if filter_bytes.is_empty() {
            log::warn!("discarding cache record with empty filter");
            return Ok(None);
        }

        Ok(Some(LoadedCache {
            filter_bytes,
            urls: record.urls,
            metadata: record.metadata,
        }))
    }

    pub async fn bytes_in_use(&self) -> Result<u64, StoreError> {
        self.store.bytes_in_use().await
    }
}

// =============================================================================
// In-memory store
// =============================================================================

/// In-memory key-value store; serves CLI one-shot runs and tests. The write
/// counter and the quota switch exist so debounce and failure behavior can
/// be observed from outside.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    writes: AtomicUsize,
    quota_exceeded: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `set` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every subsequent `set` fail with [`StoreError::QuotaExceeded`].
    pub fn set_quota_exceeded(&self, on: bool) {
        self.quota_exceeded.store(on, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        if self.quota_exceeded.load(Ordering::SeqCst) {
            return Err(StoreError::QuotaExceeded);
        }
        self.entries.lock().insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn bytes_in_use(&self) -> Result<u64, StoreError> {
        let entries = self.entries.lock();
        Ok(entries
            .iter()
            .map(|(key, value)| (key.len() + value.len()) as u64)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ms_core::{MembershipFilter, CACHE_SCHEMA_VERSION};

    fn metadata() -> CacheMetadata {
        CacheMetadata {
            version: CACHE_SCHEMA_VERSION,
            bookmark_count: 2,
            last_updated: 1_700_000_000_000,
        }
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let store = Arc::new(MemoryStore::new());
        let adapter = CacheStoreAdapter::new(store);

        let mut filter = MembershipFilter::new(10, 0.01);
        filter.add("https://a.com/1");
        filter.add("https://a.com/2");
        let bytes = filter.serialize();

        adapter
            .save(
                &bytes,
                vec!["https://a.com/1".into(), "https://a.com/2".into()],
                metadata(),
            )
            .await
            .unwrap();

        let loaded = adapter.load().await.unwrap().expect("record present");
        assert_eq!(loaded.filter_bytes, bytes);
        assert_eq!(loaded.urls.len(), 2);
        assert_eq!(loaded.metadata, metadata());

        let restored = MembershipFilter::deserialize(&loaded.filter_bytes).unwrap();
        assert!(restored.contains("https://a.com/1"));
    }

    #[tokio::test]
    async fn test_load_absent() {
        let adapter = CacheStoreAdapter::new(Arc::new(MemoryStore::new()));
        assert!(adapter.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_unparseable_record_is_absent() {
        let store = Arc::new(MemoryStore::new());
        store.set(RECORD_KEY, "{not json".into()).await.unwrap();
        let adapter = CacheStoreAdapter::new(store);
        assert!(adapter.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_missing_fields_is_absent() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(RECORD_KEY, r#"{"urls": []}"#.into())
            .await
            .unwrap();
        let adapter = CacheStoreAdapter::new(store);
        assert!(adapter.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_bad_base64_is_absent() {
        let store = Arc::new(MemoryStore::new());
        let value = serde_json::json!({
            "filterBytes": "not//valid@@base64!!",
            "urls": ["https://a.com/"],
            "metadata": {"version": 1, "bookmarkCount": 1, "lastUpdated": 0}
        });
        store.set(RECORD_KEY, value.to_string()).await.unwrap();
        let adapter = CacheStoreAdapter::new(store);
        assert!(adapter.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_quota_failure_keeps_previous_record() {
        let store = Arc::new(MemoryStore::new());
        let adapter = CacheStoreAdapter::new(store.clone());

        let bytes = MembershipFilter::new(10, 0.01).serialize();
        adapter
            .save(&bytes, vec!["https://a.com/".into()], metadata())
            .await
            .unwrap();

        store.set_quota_exceeded(true);
        let err = adapter
            .save(&bytes, Vec::new(), metadata())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded));

        // The earlier record is intact.
        store.set_quota_exceeded(false);
        let loaded = adapter.load().await.unwrap().expect("record present");
        assert_eq!(loaded.urls, vec!["https://a.com/".to_string()]);
    }

    #[tokio::test]
    async fn test_bytes_in_use_grows_with_record() {
        let store = Arc::new(MemoryStore::new());
        let adapter = CacheStoreAdapter::new(store);
        assert_eq!(adapter.bytes_in_use().await.unwrap(), 0);
        adapter
            .save(&[0u8; 64], vec!["https://a.com/".into()], metadata())
            .await
            .unwrap();
        assert!(adapter.bytes_in_use().await.unwrap() > 64);
    }
}
