//! Install and activate handlers

use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::network::Network;
use crate::storage::CacheStorage;
use futures::future::try_join_all;
use serde::Serialize;
use tracing::{debug, info};

/// Outcome of a successful install
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub cache_name: String,
    pub precached: usize,
    /// Activate immediately instead of waiting for older workers to release
    pub skip_waiting: bool,
}

/// Outcome of a successful activate
#[derive(Debug, Clone, Serialize)]
pub struct ActivateReport {
    pub cache_name: String,
    pub deleted: Vec<String>,
    /// Take control of already-open clients without a reload
    pub claim_clients: bool,
}

/// Precache every configured asset into the current cache.
///
/// All assets are fetched before anything is stored. A failed fetch or a
/// non-OK status aborts the install and leaves the cache untouched.
pub async fn install(
    storage: &dyn CacheStorage,
    network: &dyn Network,
    config: &WorkerConfig,
) -> Result<InstallReport> {
    let store = storage.open(&config.cache_name).await?;
    let requests = config.precache_requests()?;

    let responses = try_join_all(requests.iter().map(|request| async move {
        let response = network.fetch(request).await?;
        if !response.is_ok() {
            return Err(WorkerError::Precache {
                url: request.url.to_string(),
                status: response.status,
            });
        }
        debug!(url = %request.url, size = response.body.len(), "Precached asset");
        Ok::<_, WorkerError>(response)
    }))
    .await?;

    for (request, response) in requests.iter().zip(responses) {
        store.put(request, response.shareable()).await?;
    }

    info!(
        cache = %config.cache_name,
        assets = requests.len(),
        "Install complete"
    );

    Ok(InstallReport {
        cache_name: config.cache_name.clone(),
        precached: requests.len(),
        skip_waiting: true,
    })
}

/// Delete every cache whose name is not the current version
pub async fn activate(storage: &dyn CacheStorage, config: &WorkerConfig) -> Result<ActivateReport> {
    let mut deleted = Vec::new();

    for name in storage.keys().await? {
        if name == config.cache_name {
            continue;
        }
        if storage.delete(&name).await? {
            info!(cache = %name, "Deleted stale cache");
            deleted.push(name);
        }
    }

    Ok(ActivateReport {
        cache_name: config.cache_name.clone(),
        deleted,
        claim_clients: true,
    })
}
