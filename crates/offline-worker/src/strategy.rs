//! Response strategies
//!
//! Each strategy is a stateless decision tree evaluated once per request.
//! Successful network responses are copied into the cache by a background
//! task the caller never waits on.

use crate::error::{Result, WorkerError};
use crate::network::Network;
use crate::storage::CacheStore;
use crate::tasks::BackgroundTasks;
use crate::types::{FetchRequest, FetchResponse, ResponseSource, Served};
use std::sync::Arc;
use tracing::{debug, warn};

/// Serve from the cache when present, otherwise fetch and cache.
///
/// A failed fetch on a miss is returned as-is; unlike [`network_first`]
/// there is no fallback.
pub async fn cache_first(
    store: Arc<dyn CacheStore>,
    network: &dyn Network,
    tasks: &BackgroundTasks,
    request: &FetchRequest,
) -> Result<Served> {
    if let Some(cached) = store.get(request).await? {
        debug!(url = %request.url, "Serving from cache");
        return Ok(Served::new(cached, ResponseSource::Cache));
    }

    let response = network.fetch(request).await?;
    if response.is_ok() {
        cache_in_background(store, tasks, request, &response);
    }

    Ok(Served::new(response, ResponseSource::Network))
}

/// Fetch first; on network failure fall back to the cached copy, then to
/// the offline page.
pub async fn network_first(
    store: Arc<dyn CacheStore>,
    network: &dyn Network,
    tasks: &BackgroundTasks,
    request: &FetchRequest,
    offline_request: &FetchRequest,
) -> Result<Served> {
    let error = match network.fetch(request).await {
        Ok(response) => {
            if response.is_ok() {
                cache_in_background(store, tasks, request, &response);
            }
            return Ok(Served::new(response, ResponseSource::Network));
        }
        Err(e) => e,
    };

    debug!(url = %request.url, error = %error, "Network failed, trying cache");

    // A broken cache entry for the page must not hide the offline page
    match store.get(request).await {
        Ok(Some(cached)) => return Ok(Served::new(cached, ResponseSource::Cache)),
        Ok(None) => {}
        Err(e) => {
            warn!(cache = store.name(), url = %request.url, error = %e, "Cache lookup failed");
        }
    }

    if let Some(offline) = store.get(offline_request).await? {
        debug!(url = %request.url, "Serving offline page");
        return Ok(Served::new(offline, ResponseSource::OfflineFallback));
    }

    warn!(url = %request.url, "Offline with no cached copy and no offline page");
    Err(WorkerError::Offline(request.url.to_string()))
}

fn cache_in_background(
    store: Arc<dyn CacheStore>,
    tasks: &BackgroundTasks,
    request: &FetchRequest,
    response: &FetchResponse,
) {
    let request = request.clone();
    let copy = response.shareable();

    tasks.spawn(async move {
        if let Err(e) = store.put(&request, copy).await {
            warn!(cache = store.name(), url = %request.url, error = %e, "Failed to cache response");
        }
    });
}
