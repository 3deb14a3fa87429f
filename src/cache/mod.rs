//! Expiring key-value cache
//!
//! Two interchangeable backends sit behind [`ExpiringCache`]: an in-process
//! map with a periodic sweep, and a shared redis store with server-side expiry.

mod memory;
mod redis;

pub use self::memory::{CacheEntry, MemoryCache, MemoryStore};
pub use self::redis::RedisCache;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use crate::config::{CacheBackend, CacheConfig};
use crate::error::Result;

/// Trait for expiring key-value stores
///
/// Values are opaque, pre-serialized blobs. A read past an entry's expiry
/// behaves as absent whether or not the entry has been physically removed.
#[async_trait]
pub trait ExpiringCache: Send + Sync {
    /// Store `value` under `key`, replacing any prior entry, expiring
    /// `ttl_secs` seconds from now. A zero ttl leaves the key absent.
    async fn set(&self, key: &str, value: Bytes, ttl_secs: u64) -> Result<()>;

    /// Get the value for `key` if present and unexpired
    ///
    /// Backend failures are errors, never `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// List the non-expired keys matching `pattern`
    ///
    /// `"*"` matches every key. Other patterns are backend specific: the
    /// in-process backend strips `*` and matches the remainder as a substring,
    /// the redis backend uses native glob matching.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Which backend this is
    fn backend(&self) -> CacheBackend;

    /// Stop any background work owned by the cache
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Create a cache backend based on configuration
pub async fn create_cache(config: &CacheConfig) -> Result<Arc<dyn ExpiringCache>> {
    let cache: Arc<dyn ExpiringCache> = match config.backend {
        CacheBackend::Memory => Arc::new(MemoryCache::new(config.sweep_interval)),
        CacheBackend::Redis => Arc::new(RedisCache::connect(&config.redis_url).await?),
    };
    info!("Using {} cache backend", cache.backend().as_str());
    Ok(cache)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LeaseError;
    use std::time::Duration;

    #[tokio::test]
    async fn test_create_memory_cache() {
        let config = CacheConfig {
            backend: CacheBackend::Memory,
            sweep_interval: Duration::from_secs(5),
            ..CacheConfig::default()
        };

        let cache = create_cache(&config).await.unwrap();
        assert_eq!(cache.backend(), CacheBackend::Memory);

        cache.set("k", Bytes::from_static(b"v"), 30).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(Bytes::from_static(b"v")));

        cache.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_redis_cache_with_bad_url_is_unavailable() {
        let config = CacheConfig {
            backend: CacheBackend::Redis,
            redis_url: "definitely not redis".to_string(),
            ..CacheConfig::default()
        };

        let err = create_cache(&config).await.err().unwrap();
        assert!(matches!(err, LeaseError::CacheUnavailable(_)));
    }
}
