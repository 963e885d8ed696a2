use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::cache::backend::{CacheBackend, CacheBackendManager, Loader};
use crate::config::RedisConfig;
use crate::types::{CacheError, CacheValue, Result};

const VALUE_TAG_NULL: u8 = 0;
const VALUE_TAG_BYTES: u8 = 1;

const MAX_POOL_IDLE: Duration = Duration::from_secs(300);

/// Pooled Redis connection entry.
struct PooledConnection {
    connection: MultiplexedConnection,
    last_used: std::time::Instant,
}

impl PooledConnection {
    fn new(connection: MultiplexedConnection) -> Self {
        Self {
            connection,
            last_used: std::time::Instant::now(),
        }
    }

    fn is_stale(&self, max_idle: Duration) -> bool {
        self.last_used.elapsed() > max_idle
    }
}

/// Redis connection pool shared by all region handles of the remote tier.
#[derive(Clone)]
struct ConnectionPool {
    url: String,
    pool: Arc<tokio::sync::Mutex<Vec<PooledConnection>>>,
    max_size: usize,
}

impl ConnectionPool {
    fn new(url: String, max_size: usize) -> Self {
        Self {
            url,
            pool: Arc::new(tokio::sync::Mutex::new(Vec::new())),
            max_size,
        }
    }

    async fn acquire(&self) -> Result<MultiplexedConnection> {
        let mut pool = self.pool.lock().await;

        // Stale entries must not count against max_size, drop them first.
        pool.retain(|c| !c.is_stale(MAX_POOL_IDLE));

        if let Some(pooled) = pool.pop() {
            return Ok(pooled.connection);
        }

        if pool.len() >= self.max_size {
            return Err(CacheError::SystemFailure(
                "Connection pool exhausted".to_string(),
            ));
        }

        drop(pool);

        let client = redis::Client::open(self.url.as_str())
            .map_err(|e| map_redis_error("Failed to create Redis client", e))?;

        client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| map_redis_error("Failed to connect to Redis", e))
    }

    async fn release(&self, connection: MultiplexedConnection) {
        let mut pool = self.pool.lock().await;
        if pool.len() < self.max_size {
            pool.push(PooledConnection::new(connection));
        }
    }

    async fn cleanup(&self, max_idle: Duration) {
        let mut pool = self.pool.lock().await;
        pool.retain(|c| !c.is_stale(max_idle));
    }
}

/// Maps a Redis error onto the fixed `CacheError` taxonomy.
///
/// Transport-level failures become `ConnectionFailure`, server-side
/// availability problems become `SystemFailure`, and anything else the server
/// answered with becomes `DataAccess`. Type mismatches are `Serialization`,
/// which deliberately does NOT classify as infrastructure.
fn map_redis_error(context: &str, e: redis::RedisError) -> CacheError {
    use redis::ErrorKind;

    if e.is_io_error() || e.is_timeout() || e.is_connection_refusal() || e.is_connection_dropped() {
        return CacheError::ConnectionFailure(format!("{}: {}", context, e));
    }

    match e.kind() {
        ErrorKind::BusyLoadingError
        | ErrorKind::TryAgain
        | ErrorKind::ClusterDown
        | ErrorKind::MasterDown
        | ErrorKind::ReadOnly => CacheError::SystemFailure(format!("{}: {}", context, e)),
        ErrorKind::TypeError => CacheError::Serialization(format!("{}: {}", context, e)),
        _ => CacheError::DataAccess(format!("{}: {}", context, e)),
    }
}

/// Encodes a value as `[tag][payload][crc32le]`.
///
/// Tag 0 is the cached-absence marker, tag 1 carries a payload. The CRC
/// covers tag and payload.
fn encode_value(value: &CacheValue) -> Vec<u8> {
    let mut bytes = match value {
        CacheValue::Null => vec![VALUE_TAG_NULL],
        CacheValue::Bytes(data) => {
            let mut bytes = Vec::with_capacity(1 + data.len() + 4);
            bytes.push(VALUE_TAG_BYTES);
            bytes.extend_from_slice(data);
            bytes
        }
    };

    let checksum = crc32fast::hash(&bytes);
    bytes.extend_from_slice(&checksum.to_le_bytes());
    bytes
}

fn decode_value(bytes: &[u8]) -> Result<CacheValue> {
    if bytes.len() < 5 {
        return Err(CacheError::Serialization(format!(
            "Frame too short: {} bytes",
            bytes.len()
        )));
    }

    let (framed, crc_bytes) = bytes.split_at(bytes.len() - 4);
    let stored_crc = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    let computed_crc = crc32fast::hash(framed);
    if computed_crc != stored_crc {
        return Err(CacheError::Serialization(
            "CRC32 verification failed".to_string(),
        ));
    }

    match framed[0] {
        VALUE_TAG_NULL => Ok(CacheValue::Null),
        VALUE_TAG_BYTES => Ok(CacheValue::bytes(framed[1..].to_vec())),
        tag => Err(CacheError::Serialization(format!(
            "Unknown value tag: {}",
            tag
        ))),
    }
}

/// Remote-tier backend handle for one region, backed by Redis.
#[derive(Clone)]
pub struct RedisCacheBackend {
    region: String,
    pool: ConnectionPool,
    key_prefix: String,
    ttl_seconds: u64,
    metrics: Arc<RedisTierMetrics>,
}

#[derive(Debug, Default)]
struct RedisTierMetrics {
    total_requests: AtomicUsize,
    hits: AtomicUsize,
    misses: AtomicUsize,
    errors: AtomicUsize,
    pool_acquires: AtomicUsize,
}

impl RedisCacheBackend {
    fn new(region: String, pool: ConnectionPool, config: &RedisConfig) -> Self {
        let key_prefix = format!("{}{}:", config.key_prefix, region);
        Self {
            region,
            pool,
            key_prefix,
            ttl_seconds: config.ttl_seconds,
            metrics: Arc::new(RedisTierMetrics::default()),
        }
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        let conn = self.pool.acquire().await?;
        self.metrics.pool_acquires.fetch_add(1, Ordering::Relaxed);
        Ok(conn)
    }

    pub fn metrics(&self) -> RedisTierMetricsSnapshot {
        RedisTierMetricsSnapshot {
            total_requests: self.metrics.total_requests.load(Ordering::Relaxed),
            hits: self.metrics.hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            errors: self.metrics.errors.load(Ordering::Relaxed),
            pool_acquires: self.metrics.pool_acquires.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    fn name(&self) -> &str {
        &self.region
    }

    async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        self.metrics.total_requests.fetch_add(1, Ordering::Relaxed);

        let prefixed = self.prefixed(key);
        let mut conn = self.connection().await?;
        let result: redis::RedisResult<Option<Vec<u8>>> = conn.get(&prefixed).await;
        self.pool.release(conn).await;

        match result {
            Ok(Some(data)) => {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Redis hit for key {} in region {}", key, self.region);
                decode_value(&data).map(Some)
            }
            Ok(None) => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                debug!("Redis miss for key {} in region {}", key, self.region);
                Ok(None)
            }
            Err(e) => {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                error!("Redis get error for key {}: {}", key, e);
                Err(map_redis_error("Redis get failed", e))
            }
        }
    }

    async fn get_with(&self, key: &str, loader: Loader<'_>) -> Result<CacheValue> {
        if let Some(value) = self.get(key).await? {
            return Ok(value);
        }

        let value = loader().map_err(|reason| CacheError::Loader {
            key: key.to_string(),
            reason,
        })?;
        self.put(key, value.clone()).await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: CacheValue) -> Result<()> {
        let prefixed = self.prefixed(key);
        let data = encode_value(&value);

        let mut conn = self.connection().await?;
        let result: redis::RedisResult<()> = if self.ttl_seconds > 0 {
            conn.set_ex(&prefixed, data, self.ttl_seconds).await
        } else {
            conn.set(&prefixed, data).await
        };
        self.pool.release(conn).await;

        result.map_err(|e| {
            self.metrics.errors.fetch_add(1, Ordering::Relaxed);
            error!("Redis set error for key {}: {}", key, e);
            map_redis_error("Redis set failed", e)
        })
    }

    async fn put_if_absent(&self, key: &str, value: CacheValue) -> Result<Option<CacheValue>> {
        let prefixed = self.prefixed(key);
        let data = encode_value(&value);

        let mut cmd = redis::cmd("SET");
        cmd.arg(&prefixed).arg(data).arg("NX").arg("GET");
        if self.ttl_seconds > 0 {
            cmd.arg("EX").arg(self.ttl_seconds);
        }

        let mut conn = self.connection().await?;
        let result: redis::RedisResult<Option<Vec<u8>>> = cmd.query_async(&mut conn).await;
        self.pool.release(conn).await;

        match result {
            Ok(Some(previous)) => decode_value(&previous).map(Some),
            Ok(None) => Ok(None),
            Err(e) => {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                error!("Redis put_if_absent error for key {}: {}", key, e);
                Err(map_redis_error("Redis put_if_absent failed", e))
            }
        }
    }

    async fn evict(&self, key: &str) -> Result<()> {
        let prefixed = self.prefixed(key);

        let mut conn = self.connection().await?;
        let result: redis::RedisResult<usize> = conn.del(&prefixed).await;
        self.pool.release(conn).await;

        match result {
            Ok(_) => {
                debug!("Redis evict for key {} in region {}", key, self.region);
                Ok(())
            }
            Err(e) => {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                error!("Redis evict error for key {}: {}", key, e);
                Err(map_redis_error("Redis evict failed", e))
            }
        }
    }

    async fn clear(&self) -> Result<()> {
        let pattern = format!("{}*", self.key_prefix);
        let mut conn = self.connection().await?;

        let scanned = match conn.scan_match::<_, String>(&pattern).await {
            Ok(mut iter) => {
                let mut keys = Vec::new();
                while let Some(key) = iter.next_item().await {
                    keys.push(key);
                }
                Ok(keys)
            }
            Err(e) => Err(e),
        };

        let keys = match scanned {
            Ok(keys) => keys,
            Err(e) => {
                self.pool.release(conn).await;
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                error!("Redis scan error for region {}: {}", self.region, e);
                return Err(map_redis_error("Redis scan failed", e));
            }
        };

        if !keys.is_empty() {
            let result: redis::RedisResult<usize> = conn.del(&keys).await;
            if let Err(e) = result {
                self.pool.release(conn).await;
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                error!("Redis clear error for region {}: {}", self.region, e);
                return Err(map_redis_error("Redis clear failed", e));
            }
            debug!("Redis cleared {} keys in region {}", keys.len(), self.region);
        }

        self.pool.release(conn).await;
        Ok(())
    }
}

/// Point-in-time counters for one Redis region handle.
#[derive(Debug, Clone, Default)]
pub struct RedisTierMetricsSnapshot {
    pub total_requests: usize,
    pub hits: usize,
    pub misses: usize,
    pub errors: usize,
    pub pool_acquires: usize,
}

impl RedisTierMetricsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.errors as f64 / self.total_requests as f64
        }
    }
}

/// Remote-tier manager: hands out Redis-backed region handles over one shared
/// connection pool.
pub struct RedisBackendManager {
    config: RedisConfig,
    pool: ConnectionPool,
    handles: DashMap<String, Arc<RedisCacheBackend>>,
    seeded_regions: Vec<String>,
}

impl RedisBackendManager {
    /// Connects to Redis, verifying the server answers PING before any region
    /// handle is handed out.
    pub async fn connect(config: RedisConfig, seeded_regions: Vec<String>) -> Result<Self> {
        let pool = ConnectionPool::new(config.url.clone(), config.pool_size as usize);

        let mut conn = pool.acquire().await?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("Redis PING failed", e))?;
        pool.release(conn).await;

        if pong != "PONG" {
            return Err(CacheError::SystemFailure(
                "Unexpected PING response".to_string(),
            ));
        }

        debug!(
            "RedisBackendManager connected to {} with prefix '{}', pool_size={}",
            config.url, config.key_prefix, config.pool_size
        );

        Ok(Self {
            config,
            pool,
            handles: DashMap::new(),
            seeded_regions,
        })
    }

    /// Drops pooled connections idle for longer than `max_idle`.
    pub async fn cleanup(&self, max_idle: Duration) {
        self.pool.cleanup(max_idle).await;
    }

    /// Concrete handle for `region`, if one has been constructed. Exposes the
    /// tier metrics that the `CacheBackend` contract does not carry.
    pub fn backend(&self, region: &str) -> Option<Arc<RedisCacheBackend>> {
        self.handles.get(region).map(|handle| handle.clone())
    }
}

#[async_trait]
impl CacheBackendManager for RedisBackendManager {
    async fn cache(&self, region: &str) -> Result<Arc<dyn CacheBackend>> {
        let handle = self
            .handles
            .entry(region.to_string())
            .or_insert_with(|| {
                Arc::new(RedisCacheBackend::new(
                    region.to_string(),
                    self.pool.clone(),
                    &self.config,
                ))
            })
            .clone();
        Ok(handle)
    }

    fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.seeded_regions.clone();
        for entry in self.handles.iter() {
            if !names.contains(entry.key()) {
                names.push(entry.key().clone());
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let value = CacheValue::text("User-42");
        let bytes = encode_value(&value);
        assert_eq!(decode_value(&bytes).unwrap(), value);
    }

    #[test]
    fn test_encode_null_marker() {
        let bytes = encode_value(&CacheValue::Null);
        assert_eq!(bytes.len(), 5);
        assert_eq!(decode_value(&bytes).unwrap(), CacheValue::Null);
    }

    #[test]
    fn test_decode_rejects_corrupted_frame() {
        let mut bytes = encode_value(&CacheValue::text("payload"));
        bytes[2] ^= 0xff;

        let err = decode_value(&bytes).unwrap_err();
        assert!(matches!(err, CacheError::Serialization(_)));
    }

    #[test]
    fn test_decode_rejects_short_frame() {
        assert!(matches!(
            decode_value(&[1, 2, 3]),
            Err(CacheError::Serialization(_))
        ));
    }

    #[test]
    fn test_corruption_is_not_an_infrastructure_failure() {
        let mut bytes = encode_value(&CacheValue::text("payload"));
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        let err = decode_value(&bytes).unwrap_err();
        assert!(!crate::cache::classifier::is_infrastructure_failure(&err));
    }

    fn offline_manager() -> RedisBackendManager {
        RedisBackendManager {
            config: RedisConfig::default(),
            pool: ConnectionPool::new("redis://localhost:6379".to_string(), 1),
            handles: DashMap::new(),
            seeded_regions: Vec::new(),
        }
    }

    // Handle construction is lazy and never touches the network, so the
    // accessor path is testable without a server.
    #[tokio::test]
    async fn test_manager_exposes_concrete_handle_with_metrics() {
        let manager = offline_manager();
        assert!(manager.backend("users").is_none());

        let handle = manager.cache("users").await.unwrap();
        assert_eq!(handle.name(), "users");

        let backend = manager.backend("users").unwrap();
        let snapshot = backend.metrics();
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.pool_acquires, 0);
        assert!(manager.backend("sessions").is_none());
    }

    #[test]
    fn test_snapshot_rates() {
        let snapshot = RedisTierMetricsSnapshot {
            total_requests: 10,
            hits: 6,
            misses: 2,
            errors: 2,
            pool_acquires: 10,
        };
        assert_eq!(snapshot.hit_rate(), 0.75);
        assert_eq!(snapshot.error_rate(), 0.2);

        let empty = RedisTierMetricsSnapshot::default();
        assert_eq!(empty.hit_rate(), 0.0);
        assert_eq!(empty.error_rate(), 0.0);
    }
}
