//! Proxy providers
//!
//! A provider turns "I need N proxies" into proxy records, serving unexpired
//! leases from the cache first and buying only the shortfall from a brokerage.

mod kuaidaili;

pub use kuaidaili::{parse_lease, KuaidailiSource};

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tracing::{debug, info, instrument};

use crate::cache::ExpiringCache;
use crate::config::BrokerageConfig;
use crate::error::{LeaseError, Result};
use crate::models::{ProviderBrand, ProxyProtocol, ProxyRecord};
use crate::proxy::index::ProxyCacheIndex;

/// Trait for proxy acquisition
#[async_trait]
pub trait ProxyProvider: Send + Sync {
    /// Return up to `count` proxy records
    ///
    /// Fewer than `count` is a valid partial result.
    async fn acquire(&self, count: usize) -> Result<Vec<ProxyRecord>>;

    /// Brand whose leases this provider hands out
    fn brand(&self) -> ProviderBrand;
}

/// One lease as issued by a brokerage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub ip: IpAddr,
    pub port: u16,
    /// Remaining lifetime in seconds
    pub ttl_secs: u64,
}

/// Trait for the remote side of a brokerage
///
/// Implementations make exactly one remote call per `fetch` and never retry.
#[async_trait]
pub trait LeaseSource: Send + Sync {
    async fn fetch(&self, count: usize) -> Result<Vec<Lease>>;

    fn brand(&self) -> ProviderBrand;
}

/// Cache-backed provider over any lease source
pub struct CachedProvider<S> {
    source: S,
    index: ProxyCacheIndex,
    username: String,
    password: String,
    protocol: ProxyProtocol,
}

impl<S: LeaseSource> CachedProvider<S> {
    pub fn new(
        source: S,
        cache: Arc<dyn ExpiringCache>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let index = ProxyCacheIndex::new(cache, source.brand());
        Self {
            source,
            index,
            username: username.into(),
            password: password.into(),
            protocol: ProxyProtocol::default(),
        }
    }

    /// Protocol stamped on newly bought records
    pub fn with_protocol(mut self, protocol: ProxyProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn to_record(&self, lease: &Lease) -> Result<ProxyRecord> {
        let expires_at = i64::try_from(lease.ttl_secs)
            .ok()
            .and_then(ChronoDuration::try_seconds)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));
        ProxyRecord::new(
            lease.ip,
            lease.port,
            self.username.clone(),
            self.password.clone(),
            self.protocol,
            expires_at,
        )
    }
}

#[async_trait]
impl<S: LeaseSource> ProxyProvider for CachedProvider<S> {
    #[instrument(skip(self), fields(brand = %self.index.brand()))]
    async fn acquire(&self, count: usize) -> Result<Vec<ProxyRecord>> {
        let mut records = self.index.load_all().await?;
        if records.len() >= count {
            records.truncate(count);
            debug!("Served {} proxies from cache", records.len());
            return Ok(records);
        }

        let shortfall = count - records.len();
        info!(
            "Cache holds {} proxies, buying {} more",
            records.len(),
            shortfall
        );

        let leases = self.source.fetch(shortfall).await?;
        let bought = leases.len();

        for lease in &leases {
            let record = self.to_record(lease)?;
            // The cache entry lives exactly as long as the lease.
            if lease.ttl_secs > 0 {
                self.index.store(&record, lease.ttl_secs).await?;
            }
            if records.len() < count {
                records.push(record);
            }
        }

        if bought < shortfall {
            info!(
                "Brokerage returned {} of {} requested proxies",
                bought, shortfall
            );
        }
        Ok(records)
    }

    fn brand(&self) -> ProviderBrand {
        self.index.brand()
    }
}

/// Create a provider based on configuration
pub fn create_provider(
    config: &BrokerageConfig,
    cache: Arc<dyn ExpiringCache>,
) -> Result<Arc<dyn ProxyProvider>> {
    let brand = ProviderBrand::from_str(&config.brand).ok_or_else(|| {
        LeaseError::InvalidConfig(format!("Unsupported proxy brand: {}", config.brand))
    })?;

    let provider: Arc<dyn ProxyProvider> = match brand {
        ProviderBrand::Kuaidaili => Arc::new(CachedProvider::new(
            KuaidailiSource::new(config)?,
            cache,
            config.username.clone(),
            config.password.clone(),
        )
        .with_protocol(config.protocol)),
    };

    info!("Using {} proxy provider", brand);
    Ok(provider)
}
