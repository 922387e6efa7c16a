//! Directory-per-cache storage on disk
//!
//! Each cache is a directory under the storage root. Every entry is a single
//! `<sha256>.entry` file: one line of compact JSON metadata, a newline, then
//! the raw body. The metadata records the body length, so a truncated or
//! spliced file reads as corrupt. Entries are written to a temp file with a
//! process-unique name and renamed into place, so readers never observe a
//! partial write and concurrent writers to the same key resolve as last
//! write wins, whichever store handle they write through.

use super::{validate_cache_name, CacheStorage, CacheStore};
use crate::error::{Result, WorkerError};
use crate::types::{CacheStats, FetchRequest, FetchResponse};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

const ENTRY_EXTENSION: &str = "entry";

/// Temp file sequence, shared by every store in the process
static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Metadata line stored ahead of each body
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMetadata {
    method: String,
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    body_len: usize,
    created_at: DateTime<Utc>,
}

/// Persistent cache storage rooted at a directory
pub struct DiskCacheStorage {
    root: PathBuf,
}

impl DiskCacheStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Ensure the storage root exists
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        info!(root = ?self.root, "Cache storage initialized");
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheStore>> {
        validate_cache_name(name)?;

        let dir = self.root.join(name);
        fs::create_dir_all(&dir).await?;
        Ok(Arc::new(DiskCacheStore::new(name, dir)))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();

        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_cache_name(name).is_ok() {
                    names.push(name.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        validate_cache_name(name)?;

        match fs::remove_dir_all(self.root.join(name)).await {
            Ok(()) => {
                debug!(cache = name, "Deleted cache directory");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// A single cache directory
pub struct DiskCacheStore {
    name: String,
    dir: PathBuf,
}

impl DiskCacheStore {
    fn new(name: &str, dir: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            dir,
        }
    }

    /// Generate the on-disk key for a request
    pub fn entry_key(request: &FetchRequest) -> String {
        let mut hasher = Sha256::new();
        hasher.update(request.cache_identity().as_bytes());
        hex::encode(hasher.finalize())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, ENTRY_EXTENSION))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
        self.dir
            .join(format!("{}.{}.{}.tmp", key, std::process::id(), seq))
    }

    async fn remove(&self, path: &Path) {
        // Another writer may have already replaced or removed it
        let _ = fs::remove_file(path).await;
    }

    /// Body length recorded in an entry's metadata line
    async fn body_len(path: &Path) -> Result<usize> {
        let mut reader = BufReader::new(fs::File::open(path).await?);
        let mut line = Vec::new();
        reader.read_until(b'\n', &mut line).await?;

        let line = line.strip_suffix(b"\n").unwrap_or(&line);
        let metadata: EntryMetadata = serde_json::from_slice(line)?;
        Ok(metadata.body_len)
    }
}

fn encode_entry(request: &FetchRequest, response: &FetchResponse) -> Result<Vec<u8>> {
    let metadata = EntryMetadata {
        method: request.method.clone(),
        url: request.url.to_string(),
        status: response.status,
        headers: response.headers.clone(),
        body_len: response.body.len(),
        created_at: Utc::now(),
    };

    // Compact serde_json output never contains a raw newline
    let mut data = serde_json::to_vec(&metadata)?;
    data.push(b'\n');
    data.extend_from_slice(&response.body);
    Ok(data)
}

fn decode_entry(data: Vec<u8>) -> Result<(EntryMetadata, FetchResponse)> {
    let split = data
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| WorkerError::Cache("entry has no metadata line".to_string()))?;

    let metadata: EntryMetadata = serde_json::from_slice(&data[..split])?;
    let body = Bytes::from(data).slice(split + 1..);
    if body.len() != metadata.body_len {
        return Err(WorkerError::Cache(format!(
            "entry body is {} bytes, expected {}",
            body.len(),
            metadata.body_len
        )));
    }

    let response = FetchResponse {
        status: metadata.status,
        headers: metadata.headers.clone(),
        body,
    };
    Ok((metadata, response))
}

#[async_trait]
impl CacheStore for DiskCacheStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, request: &FetchRequest) -> Result<Option<FetchResponse>> {
        let key = Self::entry_key(request);
        let path = self.entry_path(&key);

        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match decode_entry(data) {
            Ok((metadata, response)) => {
                debug!(cache = %self.name, key = %key, cached_at = %metadata.created_at, "Cache hit");
                Ok(Some(response))
            }
            Err(e) => {
                warn!(cache = %self.name, key = %key, error = %e, "Corrupt cache entry, removing");
                self.remove(&path).await;
                Ok(None)
            }
        }
    }

    async fn put(&self, request: &FetchRequest, response: FetchResponse) -> Result<()> {
        let key = Self::entry_key(request);
        let data = encode_entry(request, &response)?;

        let tmp = self.temp_path(&key);
        let written = async {
            fs::write(&tmp, &data).await?;
            fs::rename(&tmp, self.entry_path(&key)).await
        }
        .await;

        if let Err(e) = written {
            self.remove(&tmp).await;
            return Err(e.into());
        }

        debug!(cache = %self.name, key = %key, size = response.body.len(), "Cached response");
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::default();
        let mut dir = fs::read_dir(&self.dir).await?;

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            // Skip entries removed or replaced since the listing
            match Self::body_len(&path).await {
                Ok(len) => {
                    stats.entries += 1;
                    stats.total_size += len as u64;
                }
                Err(e) => {
                    debug!(cache = %self.name, path = ?path, error = %e, "Skipping unreadable entry")
                }
            }
        }

        Ok(stats)
    }
}
