//! Proxy acquisition
//!
//! - `provider`: cache-first leasing from a paid brokerage
//! - `index`: per-brand view of leased proxies in the expiring cache
//! - `validator`: liveness probe through a candidate proxy
//! - `pool`: working set with single-use draws and bounded retry

pub mod index;
pub mod pool;
pub mod provider;
pub mod validator;

pub use index::ProxyCacheIndex;
pub use pool::ProxyPool;
pub use provider::{create_provider, CachedProvider, KuaidailiSource, Lease, LeaseSource, ProxyProvider};
pub use validator::{HttpValidator, ProxyValidator};
