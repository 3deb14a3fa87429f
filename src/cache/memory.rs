//! In-process cache backend

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use super::ExpiringCache;
use crate::config::CacheBackend;
use crate::error::Result;
use crate::services::{CacheSweepHandle, CacheSweepService};

/// Expiry used when `now + ttl` does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// A stored value and its absolute expiry
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Bytes,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn new(value: Bytes, ttl_secs: u64) -> Self {
        let now = Instant::now();
        let expires_at = now
            .checked_add(Duration::from_secs(ttl_secs))
            .unwrap_or_else(|| now + FAR_FUTURE);
        Self { value, expires_at }
    }

    /// An entry is expired once the clock reaches its expiry
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Shared entry storage, visible to both the cache and its sweep task
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, value: Bytes, ttl_secs: u64) {
        if ttl_secs == 0 {
            self.entries.remove(key);
            return;
        }
        self.entries
            .insert(key.to_string(), CacheEntry::new(value, ttl_secs));
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            // Lazy expiry; a concurrent `set` may have replaced it in the meantime.
            self.entries.remove_if(key, |_, entry| entry.is_expired());
        }
        None
    }

    /// Keys matching `pattern`, skipping expired entries
    ///
    /// Anything other than `"*"` has its asterisks removed and is matched as a
    /// plain substring, so `"abc*xyz"` matches keys containing `"abcxyz"`.
    pub fn keys(&self, pattern: &str) -> Vec<String> {
        let needle = if pattern == "*" {
            String::new()
        } else {
            pattern.replace('*', "")
        };

        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired())
            .filter(|entry| entry.key().contains(needle.as_str()))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Remove every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired();
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Physical entry count, including expired entries not yet swept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// In-process expiring cache
///
/// Owns a sweep task started at construction, so it must be created inside a
/// tokio runtime. The task stops on [`MemoryCache::shutdown`] or when the
/// cache is dropped.
pub struct MemoryCache {
    store: Arc<MemoryStore>,
    sweeper: CacheSweepHandle,
}

impl MemoryCache {
    pub fn new(sweep_interval: Duration) -> Self {
        let store = Arc::new(MemoryStore::new());
        let service = CacheSweepService::new(store.clone(), sweep_interval);
        let sweeper = CacheSweepHandle::spawn(service);

        debug!(
            "Created in-process cache with {}s sweep interval",
            sweep_interval.as_secs()
        );
        Self { store, sweeper }
    }

    /// Physical entry count, including expired entries not yet swept
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Run one sweep now
    pub fn purge_expired(&self) -> usize {
        self.store.purge_expired()
    }

    /// Whether the sweep task is still alive
    pub fn is_sweeping(&self) -> bool {
        self.sweeper.is_running()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl ExpiringCache for MemoryCache {
    async fn set(&self, key: &str, value: Bytes, ttl_secs: u64) -> Result<()> {
        self.store.insert(key, value, ttl_secs);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.store.get(key))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        Ok(self.store.keys(pattern))
    }

    fn backend(&self) -> CacheBackend {
        CacheBackend::Memory
    }

    async fn shutdown(&self) -> Result<()> {
        self.sweeper.shutdown();
        self.sweeper.join().await;
        Ok(())
    }
}
