//! Kuaidaili brokerage client

use std::net::{IpAddr, Ipv4Addr};
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, error, instrument};

use super::{Lease, LeaseSource};
use crate::config::BrokerageConfig;
use crate::error::{LeaseError, Result};
use crate::models::ProviderBrand;

const GET_PROXIES_PATH: &str = "/api/getdps/";

static LEASE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}):(\d{1,5}),(\d+)")
        .expect("lease pattern is valid")
});

/// Response envelope of the brokerage API
#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Option<EnvelopeData>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeData {
    #[serde(default)]
    proxy_list: Vec<String>,
}

/// Parse one `"<ip>:<port>,<ttl_seconds>"` lease
///
/// The lease may be embedded in a longer string, but anything that does not
/// carry exactly one well-formed ip/port pair is rejected.
pub fn parse_lease(raw: &str) -> Result<Lease> {
    let invalid = |reason: &str| {
        LeaseError::ProviderParseFailed(format!("invalid lease {:?}: {}", raw, reason))
    };

    if raw.matches(':').count() != 1 {
        return Err(invalid("expected exactly one ':'"));
    }

    let caps = LEASE_PATTERN
        .captures(raw)
        .ok_or_else(|| invalid("expected <ip>:<port>,<ttl>"))?;

    let ip: Ipv4Addr = caps[1].parse().map_err(|_| invalid("bad ip address"))?;
    let port: u16 = caps[2].parse().map_err(|_| invalid("port out of range"))?;
    if port == 0 {
        return Err(invalid("port out of range"));
    }
    let ttl_secs: u64 = caps[3].parse().map_err(|_| invalid("bad ttl"))?;

    Ok(Lease {
        ip: IpAddr::V4(ip),
        port,
        ttl_secs,
    })
}

/// Lease source for the Kuaidaili private proxy API
pub struct KuaidailiSource {
    client: reqwest::Client,
    api_base: String,
    secret_id: String,
    signature: String,
}

impl KuaidailiSource {
    pub fn new(config: &BrokerageConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.request_timeout)?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_id: config.secret_id.clone(),
            signature: config.signature.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.api_base, GET_PROXIES_PATH)
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LeaseError::InvalidConfig(format!("failed to build HTTP client: {}", e)))
}

#[async_trait]
impl LeaseSource for KuaidailiSource {
    #[instrument(skip(self))]
    async fn fetch(&self, count: usize) -> Result<Vec<Lease>> {
        let num = count.to_string();
        let response = self
            .client
            .get(self.endpoint())
            .query(&[
                ("secret_id", self.secret_id.as_str()),
                ("signature", self.signature.as_str()),
                ("num", num.as_str()),
                ("pt", "1"),
                ("format", "json"),
                ("sep", "1"),
                ("f_et", "1"),
            ])
            .send()
            .await
            .map_err(|e| LeaseError::ProviderRequestFailed(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Brokerage returned status {}: {}", status, body);
            return Err(LeaseError::ProviderRequestFailed(format!(
                "unexpected status {}",
                status
            )));
        }

        let envelope: Envelope = response.json().await.map_err(|e| {
            LeaseError::ProviderParseFailed(format!("malformed response envelope: {}", e))
        })?;

        if envelope.code != 0 {
            error!(
                "Brokerage rejected request with code {}: {}",
                envelope.code, envelope.msg
            );
            return Err(LeaseError::ProviderRequestFailed(format!(
                "code {}: {}",
                envelope.code, envelope.msg
            )));
        }

        let leases = envelope
            .data
            .map(|data| data.proxy_list)
            .unwrap_or_default()
            .iter()
            .map(|raw| parse_lease(raw))
            .collect::<Result<Vec<_>>>()?;

        debug!("Brokerage issued {} leases", leases.len());
        Ok(leases)
    }

    fn brand(&self) -> ProviderBrand {
        ProviderBrand::Kuaidaili
    }
}
