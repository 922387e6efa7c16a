//! Request classification
//!
//! Routing is pure URL and method matching: no state, no I/O.

use crate::config::WorkerConfig;
use crate::types::FetchRequest;
use serde::Serialize;

/// How an intercepted request is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Not intercepted; default network handling applies
    PassThrough,
    /// CDN image, cache-first
    CdnImage,
    /// Static asset, cache-first
    StaticAsset,
    /// Page, network-first with offline fallback
    Page,
}

/// Classify a request. Checks run in priority order: pass-through, CDN,
/// static asset, then page.
pub fn classify(config: &WorkerConfig, request: &FetchRequest) -> Route {
    let url = request.url.as_str();

    if !request.is_get() || url.contains(&config.live_socket_marker) {
        return Route::PassThrough;
    }

    if url.contains(&config.cdn_host_marker) {
        return Route::CdnImage;
    }

    if is_static_asset(config, url) {
        return Route::StaticAsset;
    }

    Route::Page
}

fn is_static_asset(config: &WorkerConfig, url: &str) -> bool {
    if config
        .static_path_markers
        .iter()
        .any(|marker| url.contains(marker.as_str()))
    {
        return true;
    }

    // Anchored at the end of the full URL, so a query string defeats it
    config.static_extensions.iter().any(|ext| {
        url.len() > ext.len() + 1
            && url.ends_with(ext.as_str())
            && url.as_bytes()[url.len() - ext.len() - 1] == b'.'
    })
}
