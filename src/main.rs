//! Proxy Lease - Entry Point
//!
//! Acquires one validated proxy and prints it in the forms crawlers consume.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use proxy_lease::cache::create_cache;
use proxy_lease::config::{Config, LogConfig};
use proxy_lease::proxy::{create_provider, ProxyPool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    init_tracing(&config.log);

    info!("Starting proxy lease");

    let cache = create_cache(&config.cache)
        .await
        .context("failed to open cache")?;

    let result = tokio::select! {
        result = lease_one(&config, cache.clone()) => result,
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            Ok(())
        }
    };

    if let Err(e) = cache.shutdown().await {
        error!("Cache shutdown failed: {}", e);
    }

    if let Err(e) = &result {
        error!("Proxy lease failed: {:#}", e);
    }
    result
}

async fn lease_one(
    config: &Config,
    cache: Arc<dyn proxy_lease::cache::ExpiringCache>,
) -> anyhow::Result<()> {
    let provider = create_provider(&config.brokerage, cache)?;
    let pool = ProxyPool::create(config.pool.clone(), provider)
        .await
        .context("failed to load proxy pool")?;
    info!("Proxy pool ready with {} proxies", pool.available());

    let proxy = pool
        .acquire_one()
        .await
        .context("failed to acquire a working proxy")?;

    let browser = proxy.browser_proxy();
    info!(
        proxy = %proxy,
        remaining_secs = ?proxy.remaining_secs_at(Utc::now()),
        server = %browser.server,
        username = %browser.username,
        "Acquired proxy"
    );
    println!("{}", proxy.proxy_url());
    Ok(())
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("proxy_lease={}", log.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if log.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
