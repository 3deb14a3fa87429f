//! Proxy Lease - paid proxy leasing for crawlers
//!
//! Buys short-lived proxies from a brokerage, keeps every lease in an
//! expiring cache for exactly its remaining lifetime, and hands crawlers
//! validated proxies one at a time.
//!
//! ## Features
//!
//! - Expiring cache with an in-memory backend (lazy and periodic expiry) or redis
//! - Cache-first provider that only buys the shortfall
//! - Pool with random single-use draws and a liveness probe
//! - Bounded retry around acquisition

pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod proxy;
pub mod services;

pub use config::Config;
pub use error::{LeaseError, Result};
