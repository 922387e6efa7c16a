//! Network fetch primitive

use crate::error::Result;
use crate::types::{FetchRequest, FetchResponse};
use async_trait::async_trait;

/// Performs a network fetch.
///
/// A non-OK HTTP status is a successful fetch; `Err` means the fetch itself
/// failed (typically because the origin is unreachable).
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse>;
}
