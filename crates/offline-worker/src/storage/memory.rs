//! In-memory cache storage

use super::{validate_cache_name, CacheStorage, CacheStore};
use crate::error::Result;
use crate::types::{CacheStats, FetchRequest, FetchResponse};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Cache storage held entirely in memory
#[derive(Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<BTreeMap<String, Arc<MemoryCacheStore>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Typed handle to an existing cache, without creating it
    pub async fn store(&self, name: &str) -> Option<Arc<MemoryCacheStore>> {
        self.caches.read().await.get(name).cloned()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheStore>> {
        validate_cache_name(name)?;

        if let Some(store) = self.caches.read().await.get(name) {
            return Ok(store.clone());
        }

        let mut caches = self.caches.write().await;
        let store = caches
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCacheStore::new(name)))
            .clone();
        Ok(store)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.caches.read().await.keys().cloned().collect())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.caches.write().await.remove(name).is_some())
    }
}

/// A single in-memory cache
pub struct MemoryCacheStore {
    name: String,
    entries: RwLock<HashMap<String, FetchResponse>>,
}

impl MemoryCacheStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn contains(&self, request: &FetchRequest) -> bool {
        self.entries
            .read()
            .await
            .contains_key(&request.cache_identity())
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, request: &FetchRequest) -> Result<Option<FetchResponse>> {
        let entries = self.entries.read().await;
        Ok(entries.get(&request.cache_identity()).cloned())
    }

    async fn put(&self, request: &FetchRequest, response: FetchResponse) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(request.cache_identity(), response);
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats> {
        let entries = self.entries.read().await;
        Ok(CacheStats {
            entries: entries.len(),
            total_size: entries.values().map(|r| r.body.len() as u64).sum(),
        })
    }
}
