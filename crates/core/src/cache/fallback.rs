use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

use crate::cache::backend::{CacheBackend, Loader};
use crate::cache::classifier::is_infrastructure_failure;
use crate::cache::events::{CacheOperation, DegradeEvent, DegradeEventBus};
use crate::types::{CacheError, CacheValue, Result};

/// One logical cache view over a remote (primary) and a local (fallback)
/// backend, both scoped to the same region.
///
/// Reads go to the primary; successful payload reads are synchronously
/// mirrored into the local tier so degraded reads can find them later. When a
/// primary operation fails with a classified infrastructure error the
/// operation degrades to the local tier per its own policy; any other error
/// propagates unchanged. The local tier is an approximate mirror, never an
/// authoritative source: it may be stale or incomplete at any time.
///
/// The facade holds no mutable state beyond two shared backend handles, so it
/// needs no locking of its own; concurrent-access safety is the backends'
/// contract.
pub struct FallbackCache {
    region: String,
    primary: Arc<dyn CacheBackend>,
    fallback: Arc<dyn CacheBackend>,
    events: Arc<DegradeEventBus>,
    metrics: FallbackMetrics,
}

impl std::fmt::Debug for FallbackCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackCache")
            .field("region", &self.region)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct FallbackMetrics {
    degraded_reads: AtomicUsize,
    degraded_loads: AtomicUsize,
    degraded_writes: AtomicUsize,
    skipped_writes: AtomicUsize,
    warm_writes: AtomicUsize,
}

impl FallbackCache {
    /// Both handles must be scoped to the same region; the primary's identity
    /// is canonical.
    pub fn new(
        primary: Arc<dyn CacheBackend>,
        fallback: Arc<dyn CacheBackend>,
        events: Arc<DegradeEventBus>,
    ) -> Result<Self> {
        if primary.name() != fallback.name() {
            return Err(CacheError::Configuration(format!(
                "Mismatched backend pair: primary '{}' vs fallback '{}'",
                primary.name(),
                fallback.name()
            )));
        }

        Ok(Self {
            region: primary.name().to_string(),
            primary,
            fallback,
            events,
            metrics: FallbackMetrics::default(),
        })
    }

    /// Region name; passes through the primary's identity.
    pub fn name(&self) -> &str {
        &self.region
    }

    /// Tri-state lookup. A payload hit on the primary warms the local tier
    /// before returning; cached absence and missing entries are returned
    /// as-is without touching the local tier. Under a classified
    /// infrastructure failure the result is whatever the local tier holds,
    /// which may be stale.
    pub async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        match self.primary.get(key).await {
            Ok(Some(value)) if !value.is_null() => {
                self.warm(key, &value).await;
                Ok(Some(value))
            }
            Ok(other) => Ok(other),
            Err(e) if is_infrastructure_failure(&e) => {
                self.metrics.degraded_reads.fetch_add(1, Ordering::Relaxed);
                self.degrade(CacheOperation::Get, Some(key), &e);
                self.fallback.get(key).await
            }
            Err(e) => Err(e),
        }
    }

    /// Compute-if-absent with the same fallback structure as `get`: under an
    /// infrastructure failure the *same* loader runs against the local tier
    /// so a value is still produced and cached locally. A loader failure is
    /// never grounds for further fallback.
    pub async fn get_with(&self, key: &str, loader: Loader<'_>) -> Result<CacheValue> {
        match self.primary.get_with(key, loader).await {
            Ok(value) => {
                if !value.is_null() {
                    self.warm(key, &value).await;
                }
                Ok(value)
            }
            Err(e) if is_infrastructure_failure(&e) => {
                self.metrics.degraded_loads.fetch_add(1, Ordering::Relaxed);
                self.degrade(CacheOperation::GetWith, Some(key), &e);
                self.fallback.get_with(key, loader).await
            }
            Err(e) => Err(e),
        }
    }

    /// Writes to the primary only. Under an infrastructure failure the write
    /// is skipped entirely rather than redirected to the local tier, so the
    /// tiers cannot diverge long-term through writes the primary never saw.
    pub async fn put(&self, key: &str, value: CacheValue) -> Result<()> {
        match self.primary.put(key, value).await {
            Ok(()) => Ok(()),
            Err(e) if is_infrastructure_failure(&e) => {
                self.metrics.skipped_writes.fetch_add(1, Ordering::Relaxed);
                self.degrade(CacheOperation::Put, Some(key), &e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Unlike `put`, this is retried against the local tier under an
    /// infrastructure failure: callers depend on the previous-value return
    /// contract, so silently skipping is not an option.
    pub async fn put_if_absent(
        &self,
        key: &str,
        value: CacheValue,
    ) -> Result<Option<CacheValue>> {
        match self.primary.put_if_absent(key, value.clone()).await {
            Ok(previous) => Ok(previous),
            Err(e) if is_infrastructure_failure(&e) => {
                self.metrics.degraded_writes.fetch_add(1, Ordering::Relaxed);
                self.degrade(CacheOperation::PutIfAbsent, Some(key), &e);
                self.fallback.put_if_absent(key, value).await
            }
            Err(e) => Err(e),
        }
    }

    /// Best-effort on the primary, unconditional on the local tier: a stale
    /// local entry is strictly worse than an unnecessary local eviction, so
    /// the local evict runs on every primary outcome.
    pub async fn evict(&self, key: &str) -> Result<()> {
        let primary_result = self.primary.evict(key).await;
        self.fallback.evict(key).await?;

        match primary_result {
            Ok(()) => Ok(()),
            Err(e) if is_infrastructure_failure(&e) => {
                self.degrade(CacheOperation::Evict, Some(key), &e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Same shape as `evict`: the local tier is always cleared, an
    /// infrastructure failure on the primary is swallowed with a signal.
    pub async fn clear(&self) -> Result<()> {
        let primary_result = self.primary.clear().await;
        self.fallback.clear().await?;

        match primary_result {
            Ok(()) => Ok(()),
            Err(e) if is_infrastructure_failure(&e) => {
                self.degrade(CacheOperation::Clear, None, &e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub fn metrics(&self) -> FallbackMetricsSnapshot {
        FallbackMetricsSnapshot {
            degraded_reads: self.metrics.degraded_reads.load(Ordering::Relaxed),
            degraded_loads: self.metrics.degraded_loads.load(Ordering::Relaxed),
            degraded_writes: self.metrics.degraded_writes.load(Ordering::Relaxed),
            skipped_writes: self.metrics.skipped_writes.load(Ordering::Relaxed),
            warm_writes: self.metrics.warm_writes.load(Ordering::Relaxed),
        }
    }

    /// Mirrors a primary read into the local tier. A warm failure downgrades
    /// to a log line; it must not fail the read that triggered it.
    async fn warm(&self, key: &str, value: &CacheValue) {
        match self.fallback.put(key, value.clone()).await {
            Ok(()) => {
                self.metrics.warm_writes.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(
                    region = %self.region,
                    key,
                    cause = %e,
                    "failed to warm local tier"
                );
            }
        }
    }

    fn degrade(&self, operation: CacheOperation, key: Option<&str>, cause: &CacheError) {
        warn!(
            region = %self.region,
            key = key.unwrap_or("-"),
            operation = %operation,
            cause = %cause,
            "primary tier unavailable, degrading to local tier"
        );
        self.events.publish(DegradeEvent {
            region: self.region.clone(),
            key: key.map(str::to_string),
            operation,
            cause: cause.to_string(),
            at: Utc::now(),
        });
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FallbackMetricsSnapshot {
    pub degraded_reads: usize,
    pub degraded_loads: usize,
    pub degraded_writes: usize,
    pub skipped_writes: usize,
    pub warm_writes: usize,
}

impl FallbackMetricsSnapshot {
    pub fn total_degraded(&self) -> usize {
        self.degraded_reads + self.degraded_loads + self.degraded_writes + self.skipped_writes
    }
}
