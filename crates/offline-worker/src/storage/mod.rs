//! Named cache stores
//!
//! A [`CacheStorage`] owns any number of named [`CacheStore`]s. Exactly one
//! name is current at a time; activation deletes the rest.

mod disk;
mod memory;

pub use disk::{DiskCacheStorage, DiskCacheStore};
pub use memory::{MemoryCacheStorage, MemoryCacheStore};

use crate::error::{Result, WorkerError};
use crate::types::{CacheStats, FetchRequest, FetchResponse};
use async_trait::async_trait;
use std::sync::Arc;

/// Top-level collection of named caches
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a cache by name, creating it if it does not exist
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheStore>>;

    /// Names of every existing cache, sorted
    async fn keys(&self) -> Result<Vec<String>>;

    /// Delete a cache and all its entries. Returns false if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool>;
}

/// A single named cache mapping request identity to a stored response
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn name(&self) -> &str;

    async fn get(&self, request: &FetchRequest) -> Result<Option<FetchResponse>>;

    /// Store a response, replacing any previous entry for the request
    async fn put(&self, request: &FetchRequest, response: FetchResponse) -> Result<()>;

    async fn stats(&self) -> Result<CacheStats>;
}

/// Cache names become directory names on disk, so keep them to a safe set
pub(crate) fn validate_cache_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if valid {
        Ok(())
    } else {
        Err(WorkerError::InvalidCacheName(name.to_string()))
    }
}
