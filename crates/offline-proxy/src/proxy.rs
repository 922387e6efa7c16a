//! Upstream network access for the worker

use crate::error::Result;
use async_trait::async_trait;
use offline_worker::{FetchRequest, FetchResponse, Network, WorkerError};
use reqwest::{Client, Method};
use std::time::Duration;
use tracing::{debug, warn};

/// Headers that describe a single connection and must not be forwarded
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// True for headers the proxy recomputes or drops when relaying
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
        || name.eq_ignore_ascii_case("content-length")
}

/// HTTP client for fetching from the upstream application and CDNs
pub struct UpstreamFetcher {
    client: Client,
}

impl UpstreamFetcher {
    /// Create a fetcher with the given request timeout. Redirects are
    /// relayed to the client rather than followed.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Network for UpstreamFetcher {
    async fn fetch(&self, request: &FetchRequest) -> offline_worker::Result<FetchResponse> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| WorkerError::Network(format!("invalid method: {}", e)))?;

        debug!(method = %method, url = %request.url, "Fetching from upstream");

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            if !is_hop_by_hop(name) {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            warn!(url = %request.url, error = %e, "Upstream fetch failed");
            WorkerError::Network(e.to_string())
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| WorkerError::Network(e.to_string()))?;

        debug!(url = %request.url, status, size = body.len(), "Fetched from upstream");

        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}
