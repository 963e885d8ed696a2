use async_trait::async_trait;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::cache::backend::{CacheBackend, CacheBackendManager, Loader};
use crate::config::MemoryConfig;
use crate::types::{CacheError, CacheValue, Result};

struct Entry {
    value: CacheValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: CacheValue, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Local-tier backend for one region: a bounded LRU map with optional
/// per-entry expiry. Sizing and eviction here are this tier's own policy,
/// independent of the remote tier.
pub struct MemoryCacheBackend {
    region: String,
    store: Mutex<LruCache<String, Entry>>,
    ttl: Option<Duration>,
}

impl MemoryCacheBackend {
    pub fn new(region: String, config: &MemoryConfig) -> Result<Self> {
        let capacity = NonZeroUsize::new(config.capacity).ok_or_else(|| {
            CacheError::Configuration("memory.capacity must be at least 1".to_string())
        })?;
        let ttl = (config.ttl_seconds > 0).then(|| Duration::from_secs(config.ttl_seconds));

        Ok(Self {
            region,
            store: Mutex::new(LruCache::new(capacity)),
            ttl,
        })
    }

    fn lookup(&self, key: &str) -> Option<CacheValue> {
        let mut store = self.store.lock();
        let expired = store.get(key).is_some_and(|entry| entry.is_expired());
        if expired {
            store.pop(key);
            return None;
        }
        store.get(key).map(|entry| entry.value.clone())
    }

    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    fn name(&self) -> &str {
        &self.region
    }

    async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        Ok(self.lookup(key))
    }

    async fn get_with(&self, key: &str, loader: Loader<'_>) -> Result<CacheValue> {
        if let Some(value) = self.lookup(key) {
            return Ok(value);
        }

        let value = loader().map_err(|reason| CacheError::Loader {
            key: key.to_string(),
            reason,
        })?;
        self.store
            .lock()
            .put(key.to_string(), Entry::new(value.clone(), self.ttl));
        Ok(value)
    }

    async fn put(&self, key: &str, value: CacheValue) -> Result<()> {
        self.store
            .lock()
            .put(key.to_string(), Entry::new(value, self.ttl));
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: CacheValue) -> Result<Option<CacheValue>> {
        let mut store = self.store.lock();
        let previous = store
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone());
        if let Some(previous) = previous {
            return Ok(Some(previous));
        }
        store.put(key.to_string(), Entry::new(value, self.ttl));
        Ok(None)
    }

    async fn evict(&self, key: &str) -> Result<()> {
        self.store.lock().pop(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.store.lock().clear();
        debug!("Cleared local tier for region {}", self.region);
        Ok(())
    }
}

/// Local-tier manager: one in-process store per region, created on first
/// request.
pub struct MemoryBackendManager {
    config: MemoryConfig,
    handles: DashMap<String, Arc<MemoryCacheBackend>>,
}

impl MemoryBackendManager {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            handles: DashMap::new(),
        }
    }
}

#[async_trait]
impl CacheBackendManager for MemoryBackendManager {
    async fn cache(&self, region: &str) -> Result<Arc<dyn CacheBackend>> {
        if let Some(handle) = self.handles.get(region) {
            return Ok(handle.clone() as Arc<dyn CacheBackend>);
        }

        let backend = Arc::new(MemoryCacheBackend::new(region.to_string(), &self.config)?);
        let handle = self
            .handles
            .entry(region.to_string())
            .or_insert(backend)
            .clone();
        Ok(handle)
    }

    fn cache_names(&self) -> Vec<String> {
        self.handles.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(capacity: usize, ttl_seconds: u64) -> MemoryCacheBackend {
        MemoryCacheBackend::new(
            "users".to_string(),
            &MemoryConfig {
                capacity,
                ttl_seconds,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_put_get_evict() {
        let cache = backend(16, 0);

        cache.put("u:1", CacheValue::text("alice")).await.unwrap();
        assert_eq!(
            cache.get("u:1").await.unwrap(),
            Some(CacheValue::text("alice"))
        );

        cache.evict("u:1").await.unwrap();
        assert_eq!(cache.get("u:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_null_marker_is_stored() {
        let cache = backend(16, 0);

        cache.put("missing", CacheValue::Null).await.unwrap();
        assert_eq!(
            cache.get("missing").await.unwrap(),
            Some(CacheValue::Null)
        );
    }

    #[tokio::test]
    async fn test_put_if_absent_returns_previous() {
        let cache = backend(16, 0);

        let previous = cache
            .put_if_absent("u:1", CacheValue::text("first"))
            .await
            .unwrap();
        assert_eq!(previous, None);

        let previous = cache
            .put_if_absent("u:1", CacheValue::text("second"))
            .await
            .unwrap();
        assert_eq!(previous, Some(CacheValue::text("first")));

        // The losing write must not have replaced the value.
        assert_eq!(
            cache.get("u:1").await.unwrap(),
            Some(CacheValue::text("first"))
        );
    }

    #[tokio::test]
    async fn test_lru_bound_evicts_oldest() {
        let cache = backend(2, 0);

        cache.put("a", CacheValue::text("1")).await.unwrap();
        cache.put("b", CacheValue::text("2")).await.unwrap();
        cache.put("c", CacheValue::text("3")).await.unwrap();

        assert_eq!(cache.get("a").await.unwrap(), None);
        assert_eq!(cache.get("c").await.unwrap(), Some(CacheValue::text("3")));
    }

    #[tokio::test]
    async fn test_get_with_computes_once() {
        let cache = backend(16, 0);
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let loader = || -> std::result::Result<CacheValue, String> {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(CacheValue::text("computed"))
        };

        let value = cache.get_with("k", &loader).await.unwrap();
        assert_eq!(value, CacheValue::text("computed"));

        let value = cache.get_with("k", &loader).await.unwrap();
        assert_eq!(value, CacheValue::text("computed"));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_loader_failure_propagates() {
        let cache = backend(16, 0);
        let loader = || -> std::result::Result<CacheValue, String> { Err("upstream unavailable".to_string()) };

        let err = cache.get_with("k", &loader).await.unwrap_err();
        assert!(matches!(err, CacheError::Loader { .. }));
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear_empties_region() {
        let cache = backend(16, 0);
        cache.put("a", CacheValue::text("1")).await.unwrap();
        cache.put("b", CacheValue::text("2")).await.unwrap();

        cache.clear().await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_manager_reuses_region_store() {
        let manager = MemoryBackendManager::new(MemoryConfig::default());

        let first = manager.cache("users").await.unwrap();
        first.put("u:1", CacheValue::text("alice")).await.unwrap();

        let second = manager.cache("users").await.unwrap();
        assert_eq!(
            second.get("u:1").await.unwrap(),
            Some(CacheValue::text("alice"))
        );
        assert_eq!(manager.cache_names(), vec!["users".to_string()]);
    }
}
