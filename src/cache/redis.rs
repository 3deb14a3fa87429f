//! Redis cache backend
//!
//! Expiry is delegated to the server through `SET .. EX`.

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;
use tracing::{debug, info, instrument};

use super::ExpiringCache;
use crate::config::CacheBackend;
use crate::error::Result;

/// Shared expiring store backed by redis
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    /// Connect to the redis server at `url`
    #[instrument(skip(url))]
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        info!("Connected to redis cache");
        Ok(Self { manager })
    }
}

#[async_trait]
impl ExpiringCache for RedisCache {
    async fn set(&self, key: &str, value: Bytes, ttl_secs: u64) -> Result<()> {
        let mut conn = self.manager.clone();

        if ttl_secs == 0 {
            // SET with EX 0 is rejected by the server; the key just has to go away.
            redis::cmd("DEL")
                .arg(key)
                .query_async::<_, ()>(&mut conn)
                .await?;
            return Ok(());
        }

        redis::cmd("SET")
            .arg(key)
            .arg(value.as_ref())
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<_, ()>(&mut conn)
            .await?;

        debug!("Stored {} for {}s", key, ttl_secs);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value.map(Bytes::from))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.manager.clone();
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(pattern)
            .query_async(&mut conn)
            .await?;
        Ok(keys)
    }

    fn backend(&self) -> CacheBackend {
        CacheBackend::Redis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LeaseError;
    use crate::models::ProviderBrand;
    use std::time::Duration;

    /// Cache against the server in `REDIS_URL`, or `None` to skip
    async fn live_cache() -> Option<RedisCache> {
        let url = std::env::var("REDIS_URL").ok()?;
        Some(RedisCache::connect(&url).await.unwrap())
    }

    fn unique(name: &str) -> String {
        format!("proxy_lease_test_{}_{}_{}", std::process::id(), rand::random::<u32>(), name)
    }

    #[tokio::test]
    async fn test_connect_invalid_url() {
        let result = RedisCache::connect("http://not-redis.example").await;
        assert!(matches!(result, Err(LeaseError::CacheUnavailable(_))));
    }

    #[tokio::test]
    async fn test_connect_unreachable_server() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = RedisCache::connect(&format!("redis://{}/0", addr)).await;
        assert!(matches!(result, Err(LeaseError::CacheUnavailable(_))));
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let Some(cache) = live_cache().await else {
            return;
        };
        let key = unique("roundtrip");

        cache.set(&key, Bytes::from_static(b"v1"), 60).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(Bytes::from_static(b"v1")));

        cache.set(&key, Bytes::from_static(b"v2"), 60).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(Bytes::from_static(b"v2")));

        assert_eq!(cache.get(&unique("missing")).await.unwrap(), None);
        cache.set(&key, Bytes::new(), 0).await.unwrap();
    }

    #[tokio::test]
    async fn test_entry_expires_on_server() {
        let Some(cache) = live_cache().await else {
            return;
        };
        let key = unique("expiry");

        cache.set(&key, Bytes::from_static(b"v"), 1).await.unwrap();
        assert!(cache.get(&key).await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(cache.get(&key).await.unwrap(), None);
        assert!(!cache.keys(&key).await.unwrap().contains(&key));
    }

    #[tokio::test]
    async fn test_zero_ttl_deletes_key() {
        let Some(cache) = live_cache().await else {
            return;
        };
        let key = unique("zero_ttl");

        cache.set(&key, Bytes::from_static(b"v"), 60).await.unwrap();
        cache.set(&key, Bytes::from_static(b"w"), 0).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_by_brand_pattern() {
        let Some(cache) = live_cache().await else {
            return;
        };
        let brand = ProviderBrand::Kuaidaili;
        let ours = brand.cache_key("203.0.113.7", rand::random::<u16>().max(1));
        let other = unique("other");

        cache.set(&ours, Bytes::from_static(b"x"), 60).await.unwrap();
        cache.set(&other, Bytes::from_static(b"y"), 60).await.unwrap();

        let keys = cache.keys(&brand.key_pattern()).await.unwrap();
        assert!(keys.contains(&ours));
        assert!(!keys.contains(&other));

        let all = cache.keys("*").await.unwrap();
        assert!(all.contains(&ours));
        assert!(all.contains(&other));

        cache.set(&ours, Bytes::new(), 0).await.unwrap();
        cache.set(&other, Bytes::new(), 0).await.unwrap();
    }
}
