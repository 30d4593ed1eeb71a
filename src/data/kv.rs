//! Key-value store
//!
//! Backs the revocation list and the read-through cache, each with its own
//! store so cache traffic can never push out a revocation. Two backends:
//! an in-process moka cache and Redis through a deadpool connection pool.
//! Every entry carries its own time-to-live.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use redis::AsyncCommands;
use thiserror::Error;

use crate::config::{CacheBackend, CacheConfig};

/// Key-value store failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend cannot be reached (no pooled connection)
    #[error("key-value store unavailable: {0}")]
    Unavailable(String),
    /// The operation did not finish within its deadline
    #[error("key-value operation timed out")]
    Timeout,
    /// The backend answered with an error
    #[error("key-value backend error: {0}")]
    Backend(String),
}

/// Byte-oriented store with per-key expiry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch a value; `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store a value that expires after `ttl`.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError>;

    /// Remove a key; removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Release backend resources.
    async fn close(&self);
}

/// Stores for the read cache and the revocation list.
///
/// The cache store may evict by size; the revocation store only ever drops
/// an entry when its TTL runs out.
#[derive(Clone)]
pub struct KeyValueStores {
    pub cache: Arc<dyn KeyValueStore>,
    pub revocations: Arc<dyn KeyValueStore>,
}

impl KeyValueStores {
    /// Release both stores.
    pub async fn close(&self) {
        self.cache.close().await;
        self.revocations.close().await;
    }
}

/// Build the configured backend.
///
/// The memory backend gives the cache a store bounded by `max_capacity`
/// and the revocation list an unbounded one. The Redis backend opens one
/// pool per store against the same server, which must not evict keys that
/// still have a TTL (`maxmemory-policy noeviction`).
pub async fn connect(config: &CacheConfig) -> Result<KeyValueStores, StoreError> {
    match config.backend {
        CacheBackend::Memory => {
            tracing::info!(max_capacity = config.max_capacity, "Using in-memory key-value stores");
            Ok(KeyValueStores {
                cache: Arc::new(MemoryStore::new(config.max_capacity)),
                revocations: Arc::new(MemoryStore::unbounded()),
            })
        }
        CacheBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| StoreError::Unavailable("redis url is not set".to_string()))?;
            let cache = RedisStore::connect(url, config.op_timeout()).await?;
            let revocations = match RedisStore::connect(url, config.op_timeout()).await {
                Ok(store) => store,
                Err(e) => {
                    cache.close().await;
                    return Err(e);
                }
            };
            Ok(KeyValueStores {
                cache: Arc::new(cache),
                revocations: Arc::new(revocations),
            })
        }
    }
}

// =============================================================================
// In-memory backend
// =============================================================================

#[derive(Clone)]
struct MemoryEntry {
    value: Arc<[u8]>,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, MemoryEntry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &MemoryEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &MemoryEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process store backed by moka.
///
/// State is lost on restart, so revocations only hold for the life of the
/// process. Suitable for single-instance deployments and tests.
pub struct MemoryStore {
    entries: Cache<String, MemoryEntry>,
}

impl MemoryStore {
    /// Store holding at most `max_capacity` entries, evicting the least
    /// valuable ones when full.
    pub fn new(max_capacity: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        Self { entries }
    }

    /// Store whose entries leave only when their TTL runs out.
    pub fn unbounded() -> Self {
        let entries = Cache::builder().expire_after(PerEntryTtl).build();

        Self { entries }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(key).await.map(|entry| entry.value.to_vec()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let entry = MemoryEntry {
            value: Arc::from(value),
            ttl,
        };
        self.entries.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.invalidate(key).await;
        Ok(())
    }

    async fn close(&self) {
        self.entries.invalidate_all();
    }
}

// =============================================================================
// Redis backend
// =============================================================================

/// Redis store over a deadpool connection pool.
pub struct RedisStore {
    pool: deadpool_redis::Pool,
    op_timeout: Duration,
}

impl RedisStore {
    /// Create the pool and check that a connection can be obtained.
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self, StoreError> {
        tracing::info!("Connecting to Redis");

        let mut pool_config = deadpool_redis::PoolConfig::default();
        pool_config.timeouts.wait = Some(op_timeout);
        pool_config.timeouts.create = Some(op_timeout);
        pool_config.timeouts.recycle = Some(op_timeout);

        let mut redis_config = deadpool_redis::Config::from_url(url);
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let store = Self { pool, op_timeout };
        store.get("socialhub:probe").await?;
        tracing::info!("Connected to Redis");

        Ok(store)
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout)?
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            conn.get::<_, Option<Vec<u8>>>(key)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))
        })
        .await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        // PSETEX rejects a zero expiry
        let ttl_ms = (ttl.as_millis() as u64).max(1);
        self.bounded(async {
            let mut conn = self.conn().await?;
            conn.pset_ex::<_, _, ()>(key, value, ttl_ms)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            conn.del::<_, ()>(key)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))
        })
        .await
    }

    async fn close(&self) {
        self.pool.close();
    }
}
