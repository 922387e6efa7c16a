//! Worker configuration

use crate::constants;
use crate::error::Result;
use crate::types::FetchRequest;
use url::Url;

/// Policy configuration for one worker version
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Origin that relative asset paths resolve against
    pub scope: Url,
    pub cache_name: String,
    pub offline_url: String,
    pub precache_assets: Vec<String>,
    pub cdn_host_marker: String,
    pub static_path_markers: Vec<String>,
    pub static_extensions: Vec<String>,
    pub live_socket_marker: String,
}

impl WorkerConfig {
    /// Configuration using the compiled-in policy constants
    pub fn new(scope: Url) -> Self {
        Self {
            scope,
            cache_name: constants::CACHE_NAME.to_string(),
            offline_url: constants::OFFLINE_URL.to_string(),
            precache_assets: owned(constants::PRECACHE_ASSETS),
            cdn_host_marker: constants::CDN_HOST_MARKER.to_string(),
            static_path_markers: owned(constants::STATIC_PATH_MARKERS),
            static_extensions: owned(constants::STATIC_EXTENSIONS),
            live_socket_marker: constants::LIVE_SOCKET_MARKER.to_string(),
        }
    }

    /// Resolve a path (or absolute URL) against the scope
    pub fn resolve(&self, path: &str) -> Result<Url> {
        Ok(self.scope.join(path)?)
    }

    /// GET requests for every precache asset, in list order
    pub fn precache_requests(&self) -> Result<Vec<FetchRequest>> {
        self.precache_assets
            .iter()
            .map(|path| self.resolve(path).map(FetchRequest::get))
            .collect()
    }

    /// GET request for the offline fallback page
    pub fn offline_request(&self) -> Result<FetchRequest> {
        self.resolve(&self.offline_url).map(FetchRequest::get)
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
