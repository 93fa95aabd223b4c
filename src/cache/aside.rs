//! Cache-aside lookups and stores for read-only operations.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::backend::Operation;
use crate::cache::store::{Cache, CacheError};

/// Envelope written to the cache store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Value,
    /// Milliseconds since the unix epoch.
    pub stored_at_ms: u64,
    /// Freshness window in milliseconds.
    pub ttl_ms: u64,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, payload: Value, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            payload,
            stored_at_ms: now_ms(),
            ttl_ms: ttl.as_millis() as u64,
        }
    }

    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.stored_at_ms)
    }

    /// Fresh while `age <= ttl`.
    pub fn is_fresh(&self, now_ms: u64) -> bool {
        self.age_ms(now_ms) <= self.ttl_ms
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Serialize)]
struct KeyMaterial<'a> {
    target: &'a str,
    action: &'a str,
    query: Option<&'a str>,
    params: &'a BTreeMap<String, Value>,
}

/// Deterministic cache key for an operation descriptor.
pub fn cache_key(operation: &Operation) -> String {
    let material = KeyMaterial {
        target: &operation.target,
        action: &operation.action,
        query: operation.query.as_deref(),
        params: &operation.params,
    };
    let canonical = serde_json::to_vec(&material).unwrap_or_default();
    let digest = Sha256::digest(&canonical);
    format!(
        "gateway:{}:{}:{}",
        operation.target,
        operation.action,
        hex::encode(digest)
    )
}

/// Best-effort cache-aside layer over a [`Cache`] store.
#[derive(Clone)]
pub struct CacheAside {
    store: Arc<dyn Cache>,
}

impl CacheAside {
    pub fn new(store: Arc<dyn Cache>) -> Self {
        Self { store }
    }

    /// Fresh payload for `key`, if any. Stale or unreadable entries are deleted.
    pub async fn lookup(&self, key: &str) -> Option<Value> {
        let bytes = match self.store.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) if entry.is_fresh(now_ms()) => Some(entry.payload),
            Ok(entry) => {
                tracing::debug!(
                    key = %key,
                    age_ms = entry.age_ms(now_ms()),
                    ttl_ms = entry.ttl_ms,
                    "Cache entry stale, removing"
                );
                self.evict(key).await;
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Unreadable cache entry, removing");
                self.evict(key).await;
                None
            }
        }
    }

    /// Write a fresh result. Failures are logged, never returned.
    pub async fn store(&self, key: &str, payload: &Value, ttl: Duration) {
        if let Err(e) = self.try_store(key, payload, ttl).await {
            tracing::warn!(key = %key, error = %e, "Cache write failed");
        }
    }

    async fn try_store(&self, key: &str, payload: &Value, ttl: Duration) -> Result<(), CacheError> {
        let entry = CacheEntry::new(key, payload.clone(), ttl);
        let bytes = serde_json::to_vec(&entry)?;
        self.store.set(key, bytes, ttl).await
    }

    async fn evict(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            tracing::warn!(key = %key, error = %e, "Cache delete failed");
        }
    }
}

impl std::fmt::Debug for CacheAside {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheAside").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::MemoryCache;
    use async_trait::async_trait;
    use serde_json::json;

    struct BrokenCache;

    #[async_trait]
    impl Cache for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            Err(CacheError::Unavailable("offline".into()))
        }
        async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("offline".into()))
        }
        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("offline".into()))
        }
    }

    #[test]
    fn test_key_is_deterministic() {
        let a = Operation::read("db", "query")
            .with_query("SELECT * FROM users")
            .with_param("b", 2)
            .with_param("a", 1);
        let b = Operation::read("db", "query")
            .with_query("SELECT * FROM users")
            .with_param("a", 1)
            .with_param("b", 2);
        assert_eq!(cache_key(&a), cache_key(&b));

        let other_target = Operation::read("replica", "query").with_query("SELECT * FROM users");
        let other_query = Operation::read("db", "query").with_query("SELECT 1");
        assert_ne!(cache_key(&a), cache_key(&other_target));
        assert_ne!(cache_key(&other_target), cache_key(&other_query));
        assert!(cache_key(&a).starts_with("gateway:db:query:"));
    }

    #[tokio::test]
    async fn test_store_then_hit() {
        let store = Arc::new(MemoryCache::new());
        let aside = CacheAside::new(store.clone());

        aside.store("k", &json!({"rows": 3}), Duration::from_secs(60)).await;
        assert_eq!(aside.lookup("k").await, Some(json!({"rows": 3})));
    }

    #[tokio::test]
    async fn test_stale_entry_is_miss_and_removed() {
        let store = Arc::new(MemoryCache::new());
        let aside = CacheAside::new(store.clone());

        let entry = CacheEntry {
            key: "k".into(),
            payload: json!("old"),
            stored_at_ms: now_ms() - 10_001,
            ttl_ms: 10_000,
        };
        store
            .set("k", serde_json::to_vec(&entry).unwrap(), Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(aside.lookup("k").await, None);
        assert!(!store.contains("k"), "stale entry removed by the lookup");
    }

    #[test]
    fn test_freshness_boundary() {
        let entry = CacheEntry {
            key: "k".into(),
            payload: Value::Null,
            stored_at_ms: 1_000,
            ttl_ms: 5_000,
        };
        assert!(entry.is_fresh(6_000));
        assert!(!entry.is_fresh(6_001));
    }

    #[test]
    fn test_sub_second_ttl_kept() {
        let entry = CacheEntry::new("k", Value::Null, Duration::from_millis(1_500));
        assert_eq!(entry.ttl_ms, 1_500);
        assert!(entry.is_fresh(entry.stored_at_ms + 1_500));
        assert!(!entry.is_fresh(entry.stored_at_ms + 1_501));

        let short = CacheEntry::new("k", Value::Null, Duration::from_millis(250));
        assert!(short.is_fresh(short.stored_at_ms + 100));
    }

    #[tokio::test]
    async fn test_corrupt_entry_removed() {
        let store = Arc::new(MemoryCache::new());
        let aside = CacheAside::new(store.clone());
        store.set("k", b"not json".to_vec(), Duration::ZERO).await.unwrap();

        assert_eq!(aside.lookup("k").await, None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_failures_degrade_to_miss() {
        let aside = CacheAside::new(Arc::new(BrokenCache));
        aside.store("k", &json!(1), Duration::from_secs(60)).await;
        assert_eq!(aside.lookup("k").await, None);
    }
}
