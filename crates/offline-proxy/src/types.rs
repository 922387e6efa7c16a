//! Core types for the offline proxy

use offline_worker::WorkerStats;
use serde::Serialize;
use std::path::PathBuf;
use url::Url;

/// Where cached responses are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Disk,
    Memory,
}

impl CacheBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "disk" => Some(CacheBackend::Disk),
            "memory" => Some(CacheBackend::Memory),
            _ => None,
        }
    }
}

/// Configuration for the offline proxy
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    pub upstream_url: Url,
    pub cache_backend: CacheBackend,
    pub cache_dir: PathBuf,
    pub upstream_timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: 3005,
            upstream_url: Url::parse("http://localhost:4000").expect("valid default upstream"),
            cache_backend: CacheBackend::Disk,
            cache_dir: PathBuf::from("./cache/offline"),
            upstream_timeout_secs: 30,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub upstream: String,
    pub worker: WorkerStats,
}
