use async_trait::async_trait;
use std::sync::Arc;

use crate::types::{CacheValue, Result};

/// Caller-supplied compute-on-miss function.
///
/// The loader is a plain closure so the facade can hand the *same* loader to
/// the local tier when the remote tier is unavailable. A loader failure is
/// reported as `CacheError::Loader` by the backend running it and is never
/// treated as an infrastructure failure.
pub type Loader<'a> = &'a (dyn Fn() -> std::result::Result<CacheValue, String> + Send + Sync);

/// Capability contract implemented by both cache tiers.
///
/// A backend handle is scoped to a single region; keys are addressed within
/// that region. Implementations must be safe for arbitrary concurrent
/// callers, the facade adds no locking of its own.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Region this handle is scoped to.
    fn name(&self) -> &str;

    /// Tri-state lookup: `None` when no entry exists, `Some(CacheValue::Null)`
    /// for a cached absence, `Some(CacheValue::Bytes(_))` for a payload.
    async fn get(&self, key: &str) -> Result<Option<CacheValue>>;

    /// Compute-if-absent: returns the stored value, running `loader` and
    /// storing its result when the key is missing.
    async fn get_with(&self, key: &str, loader: Loader<'_>) -> Result<CacheValue>;

    async fn put(&self, key: &str, value: CacheValue) -> Result<()>;

    /// Stores `value` only when no entry exists; returns the previous value
    /// if one was already present.
    async fn put_if_absent(&self, key: &str, value: CacheValue) -> Result<Option<CacheValue>>;

    async fn evict(&self, key: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// Hands out region-scoped backend handles for one tier.
#[async_trait]
pub trait CacheBackendManager: Send + Sync {
    /// Returns the handle for `region`, constructing it on first request.
    /// Requests for the same region return handles over the same underlying
    /// store.
    async fn cache(&self, region: &str) -> Result<Arc<dyn CacheBackend>>;

    /// Regions currently known to this tier.
    fn cache_names(&self) -> Vec<String>;
}
