//! Brand-namespaced proxy records on top of an [`ExpiringCache`]

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, instrument};

use crate::cache::ExpiringCache;
use crate::error::{LeaseError, Result};
use crate::models::{ProviderBrand, ProxyRecord};

/// Cache view specialised to one brand's proxy records
#[derive(Clone)]
pub struct ProxyCacheIndex {
    cache: Arc<dyn ExpiringCache>,
    brand: ProviderBrand,
}

impl ProxyCacheIndex {
    pub fn new(cache: Arc<dyn ExpiringCache>, brand: ProviderBrand) -> Self {
        Self { cache, brand }
    }

    pub fn brand(&self) -> ProviderBrand {
        self.brand
    }

    /// Store a record for `ttl_secs`, keyed by brand, ip and port
    pub async fn store(&self, record: &ProxyRecord, ttl_secs: u64) -> Result<()> {
        let key = self.brand.cache_key(record.ip(), record.port());
        let value = serde_json::to_vec(record)?;
        self.cache.set(&key, Bytes::from(value), ttl_secs).await?;
        debug!("Cached {} as {} for {}s", record, key, ttl_secs);
        Ok(())
    }

    /// Load every unexpired record of this brand
    #[instrument(skip(self), fields(brand = %self.brand))]
    pub async fn load_all(&self) -> Result<Vec<ProxyRecord>> {
        let keys = self.cache.keys(&self.brand.key_pattern()).await?;
        let now = Utc::now();

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            // The entry may have expired between listing and reading it.
            let Some(value) = self.cache.get(&key).await? else {
                continue;
            };

            let record = serde_json::from_slice::<ProxyRecord>(&value).map_err(|e| {
                LeaseError::CacheUnavailable(format!("corrupt proxy record at {}: {}", key, e))
            })?;
            // Shared stores can keep an entry a little past the lease itself.
            if record.is_expired_at(now) {
                debug!("Skipping expired lease {}", record);
                continue;
            }
            records.push(record);
        }

        debug!("Loaded {} cached proxies", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::models::ProxyProtocol;
    use std::time::Duration;
    use tokio::time::advance;

    fn record(ip: &str, port: u16) -> ProxyRecord {
        ProxyRecord::new(ip.parse().unwrap(), port, "u", "p", ProxyProtocol::Http, None).unwrap()
    }

    fn sorted(mut records: Vec<ProxyRecord>) -> Vec<ProxyRecord> {
        records.sort_by_key(|r| r.endpoint());
        records
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_then_load() {
        let cache: Arc<dyn ExpiringCache> = Arc::new(MemoryCache::default());
        let index = ProxyCacheIndex::new(cache.clone(), ProviderBrand::Kuaidaili);

        index.store(&record("1.2.3.4", 8080), 60).await.unwrap();
        index.store(&record("5.6.7.8", 3128), 60).await.unwrap();

        assert!(cache
            .get("kuaidaili_1.2.3.4_8080")
            .await
            .unwrap()
            .is_some());
        assert_eq!(
            sorted(index.load_all().await.unwrap()),
            vec![record("1.2.3.4", 8080), record("5.6.7.8", 3128)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_skips_expired_records() {
        let cache: Arc<dyn ExpiringCache> = Arc::new(MemoryCache::new(Duration::from_secs(3600)));
        let index = ProxyCacheIndex::new(cache, ProviderBrand::Kuaidaili);

        index.store(&record("1.2.3.4", 8080), 30).await.unwrap();
        index.store(&record("5.6.7.8", 3128), 90).await.unwrap();

        advance(Duration::from_secs(31)).await;
        assert_eq!(index.load_all().await.unwrap(), vec![record("5.6.7.8", 3128)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_ignores_other_namespaces() {
        let cache: Arc<dyn ExpiringCache> = Arc::new(MemoryCache::default());
        let index = ProxyCacheIndex::new(cache.clone(), ProviderBrand::Kuaidaili);

        cache
            .set("session_token", Bytes::from_static(b"not a record"), 60)
            .await
            .unwrap();
        index.store(&record("1.2.3.4", 8080), 60).await.unwrap();

        assert_eq!(index.load_all().await.unwrap(), vec![record("1.2.3.4", 8080)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_record_is_cache_error() {
        let cache: Arc<dyn ExpiringCache> = Arc::new(MemoryCache::default());
        let index = ProxyCacheIndex::new(cache.clone(), ProviderBrand::Kuaidaili);

        cache
            .set("kuaidaili_1.2.3.4_8080", Bytes::from_static(b"{broken"), 60)
            .await
            .unwrap();

        let err = index.load_all().await.unwrap_err();
        assert!(matches!(err, LeaseError::CacheUnavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stored_port_zero_is_cache_error() {
        let cache: Arc<dyn ExpiringCache> = Arc::new(MemoryCache::default());
        let index = ProxyCacheIndex::new(cache.clone(), ProviderBrand::Kuaidaili);

        let blob = br#"{"ip":"1.2.3.4","port":0,"user":"u","password":"p","protocol":"http","expires_at":null}"#;
        cache
            .set("kuaidaili_1.2.3.4_0", Bytes::from_static(blob), 60)
            .await
            .unwrap();

        let err = index.load_all().await.unwrap_err();
        assert!(matches!(err, LeaseError::CacheUnavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_skips_lapsed_lease_still_in_cache() {
        let cache: Arc<dyn ExpiringCache> = Arc::new(MemoryCache::default());
        let index = ProxyCacheIndex::new(cache, ProviderBrand::Kuaidaili);

        let lapsed = ProxyRecord::new(
            "1.2.3.4".parse().unwrap(),
            8080,
            "u",
            "p",
            ProxyProtocol::Http,
            Some(Utc::now() - chrono::Duration::seconds(1)),
        )
        .unwrap();
        index.store(&lapsed, 60).await.unwrap();
        index.store(&record("5.6.7.8", 3128), 60).await.unwrap();

        assert_eq!(index.load_all().await.unwrap(), vec![record("5.6.7.8", 3128)]);
    }
}
