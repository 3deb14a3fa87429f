//! Liveness probing for leased proxies
//!
//! A proxy is live if a trivial request routed through it to an echo
//! endpoint comes back with a 2xx status within the probe timeout.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::config::PoolConfig;
use crate::error::{LeaseError, Result};
use crate::models::ProxyRecord;

/// Trait for proxy liveness checks
#[async_trait]
pub trait ProxyValidator: Send + Sync {
    /// Returns `ProxyInvalid` if the proxy does not forward traffic
    async fn validate(&self, proxy: &ProxyRecord) -> Result<()>;
}

/// Probes a proxy with an HTTP GET to an echo endpoint
#[derive(Debug, Clone)]
pub struct HttpValidator {
    probe_url: String,
    timeout: Duration,
}

impl HttpValidator {
    pub fn new(probe_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            probe_url: probe_url.into(),
            timeout,
        }
    }

    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(config.probe_url.clone(), config.probe_timeout)
    }

    pub fn probe_url(&self) -> &str {
        &self.probe_url
    }
}

#[async_trait]
impl ProxyValidator for HttpValidator {
    #[instrument(skip(self, proxy), fields(proxy = %proxy))]
    async fn validate(&self, proxy: &ProxyRecord) -> Result<()> {
        debug!("Probing {} via {}", self.probe_url, proxy);

        let upstream = reqwest::Proxy::all(proxy.proxy_url())
            .map_err(|e| LeaseError::ProxyInvalid(format!("{}: bad proxy url: {}", proxy, e)))?;

        // Proxies are configured per client, so each probe gets its own.
        let client = reqwest::Client::builder()
            .proxy(upstream)
            .timeout(self.timeout)
            .build()
            .map_err(|e| LeaseError::ProxyInvalid(format!("{}: {}", proxy, e)))?;

        match client.get(&self.probe_url).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("Proxy {} is live", proxy);
                Ok(())
            }
            Ok(response) => {
                let msg = format!("{} answered probe with {}", proxy, response.status());
                warn!("Proxy is unhealthy: {}", msg);
                Err(LeaseError::ProxyInvalid(msg))
            }
            Err(e) => {
                let msg = if e.is_timeout() {
                    format!("{} probe timed out", proxy)
                } else {
                    format!("{} probe failed: {}", proxy, e)
                };
                warn!("Proxy is unhealthy: {}", msg);
                Err(LeaseError::ProxyInvalid(msg))
            }
        }
    }
}
