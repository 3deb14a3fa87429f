use crate::error::{LeaseError, Result};
use crate::models::ProxyProtocol;
use std::env;
use std::time::Duration;
use url::Url;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Expiring cache configuration
    pub cache: CacheConfig,
    /// Proxy brokerage configuration
    pub brokerage: BrokerageConfig,
    /// Proxy pool configuration
    pub pool: PoolConfig,
    /// Logging configuration
    pub log: LogConfig,
}

/// Which cache backend to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Redis,
}

impl CacheBackend {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "local" | "in_memory" => Some(Self::Memory),
            "redis" => Some(Self::Redis),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Backend selection (default: memory)
    pub backend: CacheBackend,
    /// Interval between sweeps of the in-process backend
    pub sweep_interval: Duration,
    /// Connection URL for the redis backend
    pub redis_url: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            sweep_interval: Duration::from_secs(10),
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrokerageConfig {
    /// Provider brand name (default: kuaidaili)
    pub brand: String,
    /// Base URL of the brokerage API
    pub api_base: String,
    /// API identity
    pub secret_id: String,
    /// API secret
    pub signature: String,
    /// Username for authenticating against leased proxies
    pub username: String,
    /// Password for authenticating against leased proxies
    pub password: String,
    /// Protocol spoken by leased proxies (default: http)
    pub protocol: ProxyProtocol,
    /// Request timeout for brokerage calls
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of proxies requested per refill
    pub target_count: usize,
    /// Probe each proxy before handing it out
    pub validate: bool,
    /// Echo endpoint used by the liveness probe
    pub probe_url: String,
    /// Timeout for one liveness probe
    pub probe_timeout: Duration,
    /// Attempts made by `acquire_one` before giving up
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub retry_delay: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            target_count: 2,
            validate: true,
            probe_url: "https://httpbin.org/ip".to_string(),
            probe_timeout: Duration::from_secs(10),
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let backend_raw = get_env_or("CACHE_BACKEND", "memory");
        let backend = CacheBackend::from_str(&backend_raw).ok_or_else(|| {
            LeaseError::InvalidConfig(format!("CACHE_BACKEND has unsupported value: {}", backend_raw))
        })?;

        let redis_url = get_env_or("REDIS_URL", "redis://127.0.0.1:6379/0");
        if backend == CacheBackend::Redis {
            validate_url("REDIS_URL", &redis_url, &["redis", "rediss", "redis+unix"])?;
        }

        let api_base = get_env_or("KDL_API_BASE", "https://dps.kdlapi.com");
        validate_url("KDL_API_BASE", &api_base, &["http", "https"])?;

        let probe_url = get_env_or("PROXY_PROBE_URL", "https://httpbin.org/ip");
        validate_url("PROXY_PROBE_URL", &probe_url, &["http", "https"])?;

        let protocol_raw = get_env_or("PROXY_PROTOCOL", "http");
        let protocol = ProxyProtocol::from_str(&protocol_raw).ok_or_else(|| {
            LeaseError::InvalidConfig(format!("PROXY_PROTOCOL has unsupported value: {}", protocol_raw))
        })?;

        let max_attempts: u32 = parse_env("PROXY_MAX_ATTEMPTS", "3")?;
        if max_attempts == 0 {
            return Err(LeaseError::InvalidConfig(
                "PROXY_MAX_ATTEMPTS must be at least 1".into(),
            ));
        }

        Ok(Config {
            cache: CacheConfig {
                backend,
                sweep_interval: Duration::from_secs(
                    parse_env::<u64>("CACHE_SWEEP_INTERVAL_SECS", "10")?.max(1),
                ),
                redis_url,
            },
            brokerage: BrokerageConfig {
                brand: get_env_or("PROXY_BRAND", "kuaidaili"),
                api_base,
                secret_id: get_env_or("KDL_SECRET_ID", ""),
                signature: get_env_or("KDL_SIGNATURE", ""),
                username: get_env_or("KDL_USERNAME", ""),
                password: get_env_or("KDL_PASSWORD", ""),
                protocol,
                request_timeout: Duration::from_secs(parse_env("BROKERAGE_TIMEOUT_SECS", "10")?),
            },
            pool: PoolConfig {
                target_count: parse_env("PROXY_POOL_COUNT", "2")?,
                validate: get_env_or("PROXY_VALIDATE", "true")
                    .parse()
                    .unwrap_or(true),
                probe_url,
                probe_timeout: Duration::from_secs(parse_env("PROXY_PROBE_TIMEOUT_SECS", "10")?),
                max_attempts,
                retry_delay: Duration::from_millis(parse_env("PROXY_RETRY_DELAY_MS", "1000")?),
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }
}

fn validate_url(key: &str, raw: &str, schemes: &[&str]) -> Result<()> {
    let url = Url::parse(raw)
        .map_err(|e| LeaseError::InvalidConfig(format!("{} must be a valid URL: {}", key, e)))?;

    if !schemes.contains(&url.scheme()) {
        return Err(LeaseError::InvalidConfig(format!(
            "{} has unsupported scheme: {}",
            key,
            url.scheme()
        )));
    }

    Ok(())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: &str) -> Result<T> {
    get_env_or(key, default)
        .parse()
        .map_err(|_| LeaseError::InvalidConfig(format!("{} must be a valid number", key)))
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
