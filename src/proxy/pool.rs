//! Proxy pool
//!
//! Holds a working set drawn from a provider and hands each record out at
//! most once. Records are removed from the set before any probe runs, so two
//! concurrent callers can never be given the same record from one batch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use super::provider::ProxyProvider;
use super::validator::{HttpValidator, ProxyValidator};
use crate::config::PoolConfig;
use crate::error::{LeaseError, Result};
use crate::models::ProxyRecord;

/// Pool of leased proxies with validation and bounded retry
pub struct ProxyPool {
    config: PoolConfig,
    provider: Arc<dyn ProxyProvider>,
    validator: Option<Arc<dyn ProxyValidator>>,
    working_set: Mutex<Vec<ProxyRecord>>,
    /// Bumped every time the working set is replaced
    generation: AtomicU64,
    /// Serialises refills so concurrent callers buy one batch, not several
    refill_lock: tokio::sync::Mutex<()>,
}

impl ProxyPool {
    /// Create an empty pool; validation runs only if `config.validate` is set
    pub fn new(
        config: PoolConfig,
        provider: Arc<dyn ProxyProvider>,
        validator: Arc<dyn ProxyValidator>,
    ) -> Self {
        let validator = config.validate.then_some(validator);
        Self {
            config,
            provider,
            validator,
            working_set: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
            refill_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Create a pool probing through an [`HttpValidator`] and load it
    pub async fn create(config: PoolConfig, provider: Arc<dyn ProxyProvider>) -> Result<Self> {
        let validator = Arc::new(HttpValidator::from_config(&config));
        let pool = Self::new(config, provider, validator);
        pool.load().await?;
        Ok(pool)
    }

    /// Replace the working set with a fresh batch from the provider
    #[instrument(skip(self), fields(brand = %self.provider.brand()))]
    pub async fn load(&self) -> Result<usize> {
        let records = self.provider.acquire(self.config.target_count).await?;
        let count = records.len();

        let generation = {
            let mut set = self.working_set.lock();
            *set = records;
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        info!("Loaded {} proxies (generation {})", count, generation);
        Ok(count)
    }

    /// Get one proxy, retrying up to `max_attempts` times
    ///
    /// A drawn proxy is never put back, whether or not it passes the probe.
    #[instrument(skip(self))]
    pub async fn acquire_one(&self) -> Result<ProxyRecord> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.try_acquire().await {
                Ok((proxy, _)) => return Ok(proxy),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt < max_attempts => {
                    warn!(
                        "Proxy acquisition attempt {}/{} failed: {}",
                        attempt, max_attempts, e
                    );
                    sleep(self.config.retry_delay).await;
                }
                Err(e) => {
                    error!("Proxy acquisition failed after {} attempts: {}", attempt, e);
                    return Err(LeaseError::PoolExhaustedAfterRetries {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
            }
        }
    }

    /// One attempt: refill if needed, draw, validate
    async fn try_acquire(&self) -> Result<(ProxyRecord, u64)> {
        let refilled = self.refill_if_empty().await?;

        let drawn = match self.take_random() {
            Some(drawn) => drawn,
            // Other callers drained the set between our check and the draw.
            None if !refilled => {
                self.refill_if_empty().await?;
                self.take_random().ok_or(LeaseError::NoProxiesAvailable)?
            }
            None => return Err(LeaseError::NoProxiesAvailable),
        };
        let (proxy, generation) = drawn;
        debug!("Drew {} from generation {}", proxy, generation);

        if let Some(validator) = &self.validator {
            validator.validate(&proxy).await?;
        }
        Ok((proxy, generation))
    }

    /// Load a new batch if the set is empty; returns whether this call loaded
    async fn refill_if_empty(&self) -> Result<bool> {
        if self.available() > 0 {
            return Ok(false);
        }

        let _guard = self.refill_lock.lock().await;
        // Another caller may have refilled while we waited.
        if self.available() == 0 {
            self.load().await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Remove one record at random; never suspends
    fn take_random(&self) -> Option<(ProxyRecord, u64)> {
        let mut set = self.working_set.lock();
        if set.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..set.len());
        let generation = self.generation.load(Ordering::SeqCst);
        Some((set.swap_remove(index), generation))
    }

    /// Number of records not yet handed out
    pub fn available(&self) -> usize {
        self.working_set.lock().len()
    }

    /// How many times the working set has been loaded
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}
