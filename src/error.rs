use thiserror::Error;

/// Unified error type for cache, provider and pool operations
#[derive(Error, Debug)]
pub enum LeaseError {
    // Cache errors
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    // Provider errors
    #[error("Provider request failed: {0}")]
    ProviderRequestFailed(String),

    #[error("Provider response could not be parsed: {0}")]
    ProviderParseFailed(String),

    // Pool errors
    #[error("Proxy failed liveness probe: {0}")]
    ProxyInvalid(String),

    #[error("No proxies available")]
    NoProxiesAvailable,

    #[error("Proxy pool exhausted after {attempts} attempts: {source}")]
    PoolExhaustedAfterRetries {
        attempts: u32,
        #[source]
        source: Box<LeaseError>,
    },

    #[error("Invalid proxy address: {0}")]
    InvalidProxyAddress(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for lease operations
pub type Result<T> = std::result::Result<T, LeaseError>;

impl LeaseError {
    /// Whether the pool's retry wrapper should try again after this error
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            LeaseError::InvalidConfig(_) | LeaseError::PoolExhaustedAfterRetries { .. }
        )
    }
}

// Connectivity and protocol failures from the shared store are never "key absent"
impl From<redis::RedisError> for LeaseError {
    fn from(err: redis::RedisError) -> Self {
        LeaseError::CacheUnavailable(err.to_string())
    }
}

impl From<url::ParseError> for LeaseError {
    fn from(err: url::ParseError) -> Self {
        LeaseError::InvalidConfig(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable_mapping() {
        assert!(LeaseError::ProxyInvalid("dead".to_string()).is_retryable());
        assert!(LeaseError::NoProxiesAvailable.is_retryable());
        assert!(LeaseError::ProviderRequestFailed("503".to_string()).is_retryable());
        assert!(LeaseError::CacheUnavailable("down".to_string()).is_retryable());
        assert!(!LeaseError::InvalidConfig("bad".to_string()).is_retryable());
        assert!(!LeaseError::PoolExhaustedAfterRetries {
            attempts: 3,
            source: Box::new(LeaseError::NoProxiesAvailable),
        }
        .is_retryable());
    }

    #[test]
    fn test_exhausted_error_keeps_source() {
        let err = LeaseError::PoolExhaustedAfterRetries {
            attempts: 3,
            source: Box::new(LeaseError::ProxyInvalid("1.2.3.4:8080".to_string())),
        };

        assert_eq!(
            err.to_string(),
            "Proxy pool exhausted after 3 attempts: Proxy failed liveness probe: 1.2.3.4:8080"
        );
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("1.2.3.4:8080"));
    }

    #[test]
    fn test_url_parse_error_is_config_error() {
        let err: LeaseError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, LeaseError::InvalidConfig(_)));
    }

    #[test]
    fn test_deserialize_error_converts() {
        let err: LeaseError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, LeaseError::Serialization(_)));
    }
}
