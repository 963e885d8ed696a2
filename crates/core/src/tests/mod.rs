
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::cache::backend::{CacheBackend, Loader};
use crate::types::{CacheError, CacheValue, Result};

/// In-memory backend stub with injectable failures and per-operation call
/// counters. Every operation fails with a clone of the injected error while
/// one is set.
pub(crate) struct StubBackend {
    region: String,
    store: Mutex<HashMap<String, CacheValue>>,
    failure: Mutex<Option<CacheError>>,
    pub(crate) get_calls: AtomicUsize,
    pub(crate) load_calls: AtomicUsize,
    pub(crate) put_calls: AtomicUsize,
    pub(crate) evict_calls: AtomicUsize,
    pub(crate) clear_calls: AtomicUsize,
}

impl StubBackend {
    pub(crate) fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
            store: Mutex::new(HashMap::new()),
            failure: Mutex::new(None),
            get_calls: AtomicUsize::new(0),
            load_calls: AtomicUsize::new(0),
            put_calls: AtomicUsize::new(0),
            evict_calls: AtomicUsize::new(0),
            clear_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_failure(&self, failure: Option<CacheError>) {
        *self.failure.lock() = failure;
    }

    pub(crate) fn seed(&self, key: &str, value: CacheValue) {
        self.store.lock().insert(key.to_string(), value);
    }

    pub(crate) fn value_of(&self, key: &str) -> Option<CacheValue> {
        self.store.lock().get(key).cloned()
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.store.lock().contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.store.lock().len()
    }

    fn check_failure(&self) -> Result<()> {
        match self.failure.lock().clone() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CacheBackend for StubBackend {
    fn name(&self) -> &str {
        &self.region
    }

    async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(self.store.lock().get(key).cloned())
    }

    async fn get_with(&self, key: &str, loader: Loader<'_>) -> Result<CacheValue> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        if let Some(value) = self.store.lock().get(key).cloned() {
            return Ok(value);
        }

        let value = loader().map_err(|reason| CacheError::Loader {
            key: key.to_string(),
            reason,
        })?;
        self.store.lock().insert(key.to_string(), value.clone());
        Ok(value)
    }

    async fn put(&self, key: &str, value: CacheValue) -> Result<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        self.store.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: CacheValue) -> Result<Option<CacheValue>> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        let mut store = self.store.lock();
        if let Some(previous) = store.get(key).cloned() {
            return Ok(Some(previous));
        }
        store.insert(key.to_string(), value);
        Ok(None)
    }

    async fn evict(&self, key: &str) -> Result<()> {
        self.evict_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        self.store.lock().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        self.store.lock().clear();
        Ok(())
    }
}

pub(crate) fn outage() -> CacheError {
    CacheError::ConnectionFailure("connection refused".to_string())
}

/// Opt-in log output for debugging test failures, driven by `RUST_LOG`.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
