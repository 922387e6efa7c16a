//! Offline cache worker
//!
//! Intercepts requests for a web application and answers them from a named
//! cache under three policies: cache-first for static assets, cache-first
//! for CDN images, and network-first with an offline fallback for pages.
//! Storage and network are injected, so the same policy runs behind the
//! `offline-proxy` server or against in-memory fakes in tests.

pub mod config;
pub mod constants;
pub mod error;
pub mod lifecycle;
pub mod network;
pub mod router;
pub mod storage;
pub mod strategy;
pub mod tasks;
pub mod types;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::WorkerConfig;
pub use error::{Result, WorkerError};
pub use lifecycle::{ActivateReport, InstallReport};
pub use network::Network;
pub use router::{classify, Route};
pub use storage::{CacheStorage, CacheStore, DiskCacheStorage, MemoryCacheStorage};
pub use tasks::BackgroundTasks;
pub use types::{CacheStats, FetchRequest, FetchResponse, ResponseSource, Served};
pub use worker::{FetchDecision, OfflineWorker, WorkerState, WorkerStats};
