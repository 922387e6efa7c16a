//! Tracking for fire-and-forget background work

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinSet;
use tracing::warn;

/// Set of detached tasks (cache writes) that callers never await.
///
/// [`BackgroundTasks::settle`] waits for everything spawned so far, which
/// lets tests assert on cache contents without racing the writes.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    set: Arc<Mutex<JoinSet<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawn a task on the current tokio runtime without awaiting it
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut set = self.lock();
        // Reap finished tasks so the set does not grow unbounded
        while let Some(result) = set.try_join_next() {
            log_join_error(result);
        }
        set.spawn(task);
    }

    /// Number of spawned tasks not yet reaped
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Wait until every task spawned so far, and any they spawn, has finished
    pub async fn settle(&self) {
        loop {
            let mut set = std::mem::take(&mut *self.lock());
            if set.is_empty() {
                return;
            }
            while let Some(result) = set.join_next().await {
                log_join_error(result);
            }
        }
    }
}

fn log_join_error(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            warn!(error = %e, "Background task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_settle_waits_for_spawned_tasks() {
        let tasks = BackgroundTasks::new();
        let done = Arc::new(AtomicUsize::new(0));

        for i in 0..5u64 {
            let done = done.clone();
            tasks.spawn(async move {
                tokio::time::sleep(Duration::from_millis(5 * i)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        tasks.settle().await;
        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert_eq!(tasks.pending(), 0);
    }

    #[tokio::test]
    async fn test_settle_on_empty_returns() {
        BackgroundTasks::new().settle().await;
    }

    #[tokio::test]
    async fn test_settle_covers_nested_spawns() {
        let tasks = BackgroundTasks::new();
        let done = Arc::new(AtomicUsize::new(0));

        let inner_tasks = tasks.clone();
        let inner_done = done.clone();
        tasks.spawn(async move {
            inner_tasks.spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                inner_done.fetch_add(1, Ordering::SeqCst);
            });
        });

        tasks.settle().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_break_settle() {
        let tasks = BackgroundTasks::new();
        tasks.spawn(async { panic!("write failed") });
        tasks.spawn(async {});
        tasks.settle().await;
        assert_eq!(tasks.pending(), 0);
    }
}
