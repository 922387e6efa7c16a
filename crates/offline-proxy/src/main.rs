//! Offline Proxy - offline-first caching reverse proxy
//!
//! Sits in front of the web application and answers requests through the
//! offline worker: cache-first for static assets and CDN images,
//! network-first with an offline fallback for pages.

mod error;
mod proxy;
mod server;
mod types;

use crate::error::{ProxyError, Result};
use crate::proxy::UpstreamFetcher;
use crate::server::{start_server, ServerState, SharedState};
use crate::types::{CacheBackend, ProxyConfig};
use offline_worker::{
    CacheStorage, DiskCacheStorage, MemoryCacheStorage, Network, OfflineWorker, WorkerConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};
use url::Url;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("offline_proxy=info".parse()?)
        .add_directive("offline_worker=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting Offline Proxy...");

    let config = load_config()?;
    info!("Port: {}", config.port);
    info!("Upstream: {}", config.upstream_url);
    info!("Cache backend: {:?}", config.cache_backend);
    info!("Cache dir: {:?}", config.cache_dir);

    let storage: Arc<dyn CacheStorage> = match config.cache_backend {
        CacheBackend::Disk => {
            let storage = DiskCacheStorage::new(config.cache_dir.clone());
            storage.init().await?;
            Arc::new(storage)
        }
        CacheBackend::Memory => Arc::new(MemoryCacheStorage::new()),
    };

    let network: Arc<dyn Network> = Arc::new(UpstreamFetcher::new(Duration::from_secs(
        config.upstream_timeout_secs,
    ))?);

    let worker = OfflineWorker::new(
        WorkerConfig::new(config.upstream_url.clone()),
        storage,
        network.clone(),
    );

    // A failed install leaves the proxy serving in pass-through mode
    match worker.install().await {
        Ok(report) => {
            info!(
                cache = %report.cache_name,
                precached = report.precached,
                "Worker installed"
            );
            if report.skip_waiting {
                if let Err(e) = worker.activate().await {
                    error!(error = %e, "Worker activation failed");
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "Worker install failed, passing all requests through");
        }
    }

    let state: SharedState = Arc::new(ServerState::new(
        worker,
        network,
        config.upstream_url.clone(),
    ));

    // Start HTTP server (blocking)
    start_server(state, config.port)
        .await
        .map_err(|e| ProxyError::Config(format!("Server error: {}", e)))?;

    Ok(())
}

fn load_config() -> Result<ProxyConfig> {
    let defaults = ProxyConfig::default();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(defaults.port);

    let upstream_url = match std::env::var("UPSTREAM_URL") {
        Ok(s) => Url::parse(&s)
            .map_err(|e| ProxyError::Config(format!("invalid UPSTREAM_URL {}: {}", s, e)))?,
        Err(_) => defaults.upstream_url,
    };

    let cache_backend = match std::env::var("CACHE_BACKEND") {
        Ok(s) => CacheBackend::parse(&s)
            .ok_or_else(|| ProxyError::Config(format!("unknown CACHE_BACKEND {}", s)))?,
        Err(_) => defaults.cache_backend,
    };

    let cache_dir = std::env::var("CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or(defaults.cache_dir);

    let upstream_timeout_secs = std::env::var("UPSTREAM_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(defaults.upstream_timeout_secs);

    Ok(ProxyConfig {
        port,
        upstream_url,
        cache_backend,
        cache_dir,
        upstream_timeout_secs,
    })
}
