use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::cache::backend::CacheBackendManager;
use crate::cache::events::{DegradeEvent, DegradeEventBus};
use crate::cache::fallback::FallbackCache;
use crate::types::Result;

/// Maps region names to `FallbackCache` instances, constructing one per
/// region on first request from the two tier managers.
///
/// Construction is single-flight: concurrent first requests for the same
/// region resolve to the same instance and hit the tier managers once.
/// Regions live for the life of the manager; there is no teardown.
pub struct FallbackCacheManager {
    primary: Arc<dyn CacheBackendManager>,
    fallback: Arc<dyn CacheBackendManager>,
    caches: DashMap<String, Arc<FallbackCache>>,
    build_lock: tokio::sync::Mutex<()>,
    events: Arc<DegradeEventBus>,
}

impl FallbackCacheManager {
    pub fn new(
        primary: Arc<dyn CacheBackendManager>,
        fallback: Arc<dyn CacheBackendManager>,
    ) -> Self {
        Self {
            primary,
            fallback,
            caches: DashMap::new(),
            build_lock: tokio::sync::Mutex::new(()),
            events: Arc::new(DegradeEventBus::default()),
        }
    }

    /// Returns the fallback cache for `region`, building it on first request.
    /// Backend construction failures propagate unclassified; this method adds
    /// no failure handling of its own.
    pub async fn cache(&self, region: &str) -> Result<Arc<FallbackCache>> {
        if let Some(cache) = self.caches.get(region) {
            return Ok(cache.clone());
        }

        let _guard = self.build_lock.lock().await;

        // Double check: another caller may have built it while we waited.
        if let Some(cache) = self.caches.get(region) {
            return Ok(cache.clone());
        }

        let primary = self.primary.cache(region).await?;
        let fallback = self.fallback.cache(region).await?;
        let cache = Arc::new(FallbackCache::new(primary, fallback, self.events.clone())?);

        self.caches.insert(region.to_string(), cache.clone());
        debug!("Constructed fallback cache for region {}", region);
        Ok(cache)
    }

    /// Regions known to the primary tier. The primary is the canonical source
    /// of truth for what regions exist; local-only regions are not surfaced.
    pub fn cache_names(&self) -> Vec<String> {
        self.primary.cache_names()
    }

    /// Subscribes to degrade events from every region of this manager.
    pub fn subscribe_events(&self) -> broadcast::Receiver<DegradeEvent> {
        self.events.subscribe()
    }
}
