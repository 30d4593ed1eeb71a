//! Read-through cache
//!
//! Cache-aside over its own key-value store. Values are JSON encoded
//! under `cache:<key>`. The cache is an accelerator only: when the store
//! misbehaves, reads fall through to the source and writes are dropped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::kv::KeyValueStore;
use crate::metrics::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL, CACHE_WRITE_FAILURES_TOTAL};

const KEY_PREFIX: &str = "cache:";

/// Metric label for a cache key: the part before the first `:`.
fn cache_name(key: &str) -> &str {
    key.split_once(':').map(|(name, _)| name).unwrap_or(key)
}

/// Cache-aside store
#[derive(Clone)]
pub struct CacheAsideStore {
    kv: Arc<dyn KeyValueStore>,
}

impl CacheAsideStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    fn storage_key(key: &str) -> String {
        format!("{}{}", KEY_PREFIX, key)
    }

    /// Return the cached value for `key`, or compute it with `fetch` and
    /// cache it for `ttl`.
    ///
    /// A fetch error is returned unchanged and nothing is cached. Store
    /// errors and undecodable entries are treated as misses.
    pub async fn get_or_fetch<T, E, F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let name = cache_name(key);
        let storage_key = Self::storage_key(key);

        match self.kv.get(&storage_key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<T>(&bytes) {
                Ok(value) => {
                    CACHE_HITS_TOTAL.with_label_values(&[name]).inc();
                    tracing::debug!(key, "cache hit");
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!(key, error = %e, "Discarding undecodable cache entry");
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache read failed, falling through to source");
            }
        }

        CACHE_MISSES_TOTAL.with_label_values(&[name]).inc();
        let value = fetch().await?;

        match serde_json::to_vec(&value) {
            Ok(bytes) => {
                if let Err(e) = self.kv.set(&storage_key, &bytes, ttl).await {
                    CACHE_WRITE_FAILURES_TOTAL.with_label_values(&[name]).inc();
                    tracing::warn!(key, error = %e, "Cache write failed");
                }
            }
            Err(e) => {
                CACHE_WRITE_FAILURES_TOTAL.with_label_values(&[name]).inc();
                tracing::warn!(key, error = %e, "Cache value could not be encoded");
            }
        }

        Ok(value)
    }

    /// Drop the cached value for `key`.
    ///
    /// Failures are logged; the entry then ages out with its TTL.
    pub async fn invalidate(&self, key: &str) {
        if let Err(e) = self.kv.delete(&Self::storage_key(key)).await {
            tracing::warn!(key, error = %e, "Cache invalidation failed");
        } else {
            tracing::debug!(key, "cache invalidated");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::data::{MemoryStore, MockKeyValueStore, StoreError};

    #[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
    struct Item {
        name: String,
    }

    fn item(name: &str) -> Item {
        Item {
            name: name.to_string(),
        }
    }

    #[test]
    fn cache_name_is_the_key_prefix() {
        assert_eq!(cache_name("feed:01ABC"), "feed");
        assert_eq!(cache_name("profile:x:y"), "profile");
        assert_eq!(cache_name("plain"), "plain");
    }

    #[tokio::test]
    async fn second_read_is_served_from_cache() {
        let cache = CacheAsideStore::new(Arc::new(MemoryStore::new(100)));
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: Result<Item, String> = cache
                .get_or_fetch("feed:a", Duration::from_secs(60), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(item("a"))
                })
                .await;
            assert_eq!(value.unwrap(), item("a"));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetch_error_is_returned_and_not_cached() {
        let cache = CacheAsideStore::new(Arc::new(MemoryStore::new(100)));

        let first: Result<Item, String> = cache
            .get_or_fetch("feed:a", Duration::from_secs(60), || async {
                Err("source down".to_string())
            })
            .await;
        assert_eq!(first.unwrap_err(), "source down");

        let second: Result<Item, String> = cache
            .get_or_fetch("feed:a", Duration::from_secs(60), || async { Ok(item("fresh")) })
            .await;
        assert_eq!(second.unwrap(), item("fresh"));
    }

    #[tokio::test]
    async fn expired_entry_is_refetched() {
        let cache = CacheAsideStore::new(Arc::new(MemoryStore::new(100)));

        let _: Result<Item, String> = cache
            .get_or_fetch("feed:a", Duration::from_millis(50), || async { Ok(item("old")) })
            .await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        let value: Result<Item, String> = cache
            .get_or_fetch("feed:a", Duration::from_millis(50), || async { Ok(item("new")) })
            .await;
        assert_eq!(value.unwrap(), item("new"));
    }

    #[tokio::test]
    async fn invalidate_forces_a_refetch() {
        let cache = CacheAsideStore::new(Arc::new(MemoryStore::new(100)));

        let _: Result<Item, String> = cache
            .get_or_fetch("profile:a", Duration::from_secs(60), || async { Ok(item("old")) })
            .await;
        cache.invalidate("profile:a").await;

        let value: Result<Item, String> = cache
            .get_or_fetch("profile:a", Duration::from_secs(60), || async { Ok(item("new")) })
            .await;
        assert_eq!(value.unwrap(), item("new"));
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss() {
        let kv = Arc::new(MemoryStore::new(100));
        kv.set("cache:feed:a", b"{not json", Duration::from_secs(60))
            .await
            .unwrap();
        let cache = CacheAsideStore::new(kv);

        let value: Result<Item, String> = cache
            .get_or_fetch("feed:a", Duration::from_secs(60), || async { Ok(item("fresh")) })
            .await;
        assert_eq!(value.unwrap(), item("fresh"));
    }

    #[tokio::test]
    async fn store_failures_degrade_to_the_source() {
        let mut kv = MockKeyValueStore::new();
        kv.expect_get()
            .returning(|_| Err(StoreError::Unavailable("down".to_string())));
        kv.expect_set()
            .times(1)
            .returning(|_, _, _| Err(StoreError::Timeout));
        let cache = CacheAsideStore::new(Arc::new(kv));

        let value: Result<Item, String> = cache
            .get_or_fetch("feed:a", Duration::from_secs(60), || async { Ok(item("fresh")) })
            .await;
        assert_eq!(value.unwrap(), item("fresh"));
    }

    #[tokio::test]
    async fn values_are_stored_under_the_cache_namespace() {
        let mut kv = MockKeyValueStore::new();
        kv.expect_get()
            .withf(|key| key == "cache:profile:42")
            .returning(|_| Ok(None));
        kv.expect_set()
            .withf(|key, _, ttl| key == "cache:profile:42" && *ttl == Duration::from_secs(5))
            .times(1)
            .returning(|_, _, _| Ok(()));
        let cache = CacheAsideStore::new(Arc::new(kv));

        let _: Result<Item, String> = cache
            .get_or_fetch("profile:42", Duration::from_secs(5), || async { Ok(item("x")) })
            .await;
    }
}
