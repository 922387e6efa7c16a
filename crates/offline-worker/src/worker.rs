//! The worker state handle
//!
//! [`OfflineWorker`] is built once at startup with its storage and network
//! injected, then driven by the host: `install`, `activate`, and one
//! `handle_fetch` per intercepted request.

use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::lifecycle::{self, ActivateReport, InstallReport};
use crate::network::Network;
use crate::router::{classify, Route};
use crate::storage::{CacheStorage, CacheStore};
use crate::strategy;
use crate::tasks::BackgroundTasks;
use crate::types::{FetchRequest, ResponseSource, Served};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info};

/// Worker lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Constructed, install not yet run
    Parsed,
    Installing,
    /// Precache complete, waiting to activate
    Installed,
    Activating,
    /// Controlling requests
    Activated,
    /// Install failed; this version never takes control
    Redundant,
}

impl WorkerState {
    /// Only an activated worker intercepts fetches
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, WorkerState::Activated)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Parsed => write!(f, "parsed"),
            WorkerState::Installing => write!(f, "installing"),
            WorkerState::Installed => write!(f, "installed"),
            WorkerState::Activating => write!(f, "activating"),
            WorkerState::Activated => write!(f, "activated"),
            WorkerState::Redundant => write!(f, "redundant"),
        }
    }
}

/// Result of a fetch event
#[derive(Debug, Clone)]
pub enum FetchDecision {
    /// Not intercepted; the host performs its default network handling
    PassThrough,
    Respond(Served),
}

/// Snapshot of worker and cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub state: WorkerState,
    pub cache_name: String,
    pub entries: usize,
    pub total_size: u64,
    pub hits: u64,
    pub misses: u64,
}

pub struct OfflineWorker {
    config: Arc<WorkerConfig>,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    tasks: BackgroundTasks,
    state: RwLock<WorkerState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl OfflineWorker {
    pub fn new(
        config: WorkerConfig,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            storage,
            network,
            tasks: BackgroundTasks::new(),
            state: RwLock::new(WorkerState::Parsed),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: WorkerState) {
        *self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
        debug!(state = %state, "Worker state changed");
    }

    /// Handle the install event: precache into the current cache version
    pub async fn install(&self) -> Result<InstallReport> {
        match self.state() {
            WorkerState::Parsed | WorkerState::Redundant => {}
            state => {
                return Err(WorkerError::Lifecycle(format!(
                    "cannot install a worker in state {}",
                    state
                )))
            }
        }

        self.set_state(WorkerState::Installing);
        match lifecycle::install(self.storage.as_ref(), self.network.as_ref(), &self.config).await
        {
            Ok(report) => {
                self.set_state(WorkerState::Installed);
                Ok(report)
            }
            Err(e) => {
                error!(cache = %self.config.cache_name, error = %e, "Install failed");
                self.set_state(WorkerState::Redundant);
                Err(e)
            }
        }
    }

    /// Handle the activate event: delete stale caches and take control
    pub async fn activate(&self) -> Result<ActivateReport> {
        let state = self.state();
        if state != WorkerState::Installed {
            return Err(WorkerError::Lifecycle(format!(
                "cannot activate a worker in state {}",
                state
            )));
        }

        self.set_state(WorkerState::Activating);
        match lifecycle::activate(self.storage.as_ref(), &self.config).await {
            Ok(report) => {
                self.set_state(WorkerState::Activated);
                info!(
                    cache = %report.cache_name,
                    deleted = report.deleted.len(),
                    "Worker activated"
                );
                Ok(report)
            }
            Err(e) => {
                // Stale caches may linger; activation can be retried
                self.set_state(WorkerState::Installed);
                Err(e)
            }
        }
    }

    /// Handle one intercepted request
    pub async fn handle_fetch(&self, request: &FetchRequest) -> Result<FetchDecision> {
        if !self.state().can_intercept_fetch() {
            return Ok(FetchDecision::PassThrough);
        }

        let route = classify(&self.config, request);
        debug!(method = %request.method, url = %request.url, route = ?route, "Routing request");

        let served = match route {
            Route::PassThrough => return Ok(FetchDecision::PassThrough),
            Route::CdnImage | Route::StaticAsset => {
                let store = self.current_store().await?;
                strategy::cache_first(store, self.network.as_ref(), &self.tasks, request).await?
            }
            Route::Page => {
                let store = self.current_store().await?;
                let offline = self.config.offline_request()?;
                strategy::network_first(
                    store,
                    self.network.as_ref(),
                    &self.tasks,
                    request,
                    &offline,
                )
                .await?
            }
        };

        match served.source {
            ResponseSource::Cache | ResponseSource::OfflineFallback => {
                self.hits.fetch_add(1, Ordering::Relaxed)
            }
            ResponseSource::Network => self.misses.fetch_add(1, Ordering::Relaxed),
        };

        Ok(FetchDecision::Respond(served))
    }

    /// Wait for every background cache write spawned so far
    pub async fn settle(&self) {
        self.tasks.settle().await;
    }

    pub async fn stats(&self) -> Result<WorkerStats> {
        let cache = self.current_store().await?.stats().await?;

        Ok(WorkerStats {
            state: self.state(),
            cache_name: self.config.cache_name.clone(),
            entries: cache.entries,
            total_size: cache.total_size,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        })
    }

    async fn current_store(&self) -> Result<Arc<dyn CacheStore>> {
        self.storage.open(&self.config.cache_name).await
    }
}
