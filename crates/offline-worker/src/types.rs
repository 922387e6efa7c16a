//! Request, response and statistics types

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

/// An intercepted request, scoped to a single fetch event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: String,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl FetchRequest {
    /// Create a request with the given method and no headers or body
    pub fn new(method: &str, url: Url) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Create a GET request
    pub fn get(url: Url) -> Self {
        Self::new("GET", url)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }

    /// Identity of this request inside a cache store (method + URL)
    pub fn cache_identity(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// A response produced by the network or read back from a cache store.
///
/// Bodies are reference counted, so `clone()` is the cheap duplicate taken
/// before a response is handed to the caller and a copy goes to the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Status is in the 2xx range
    pub fn is_ok(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    /// First header value with the given name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Copy suitable for a cache shared between clients: headers that bind
    /// a response to one user session are dropped.
    pub fn shareable(&self) -> Self {
        Self {
            status: self.status,
            headers: self
                .headers
                .iter()
                .filter(|(name, _)| !is_session_header(name))
                .cloned()
                .collect(),
            body: self.body.clone(),
        }
    }
}

fn is_session_header(name: &str) -> bool {
    SESSION_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Response headers never written to the cache
const SESSION_HEADERS: &[&str] = &["set-cookie", "set-cookie2"];

/// Where a served response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Cache,
    Network,
    OfflineFallback,
}

/// A response chosen by one of the strategies
#[derive(Debug, Clone)]
pub struct Served {
    pub response: FetchResponse,
    pub source: ResponseSource,
}

impl Served {
    pub fn new(response: FetchResponse, source: ResponseSource) -> Self {
        Self { response, source }
    }
}

/// Statistics about a single cache store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
}
