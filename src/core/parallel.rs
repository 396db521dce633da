use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

pub const DEFAULT_MAX_WORKERS: usize = 5;

/// Runs independent work units concurrently with a bounded worker count.
///
/// Outcomes come back in completion order, not submission order. A unit
/// that fails (or panics) yields `None` in its slot and a warning in the
/// log; siblings are never aborted. Callers needing positional
/// correspondence should carry the unit's identity inside its result.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    max_workers: usize,
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORKERS)
    }
}

impl TaskRunner {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }

    pub async fn run<T, F, Fut>(&self, units: Vec<F>) -> Vec<Option<T>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let total = units.len();
        let mut pending = FuturesUnordered::new();

        // Everything is submitted before the first outcome is awaited.
        for (index, unit) in units.into_iter().enumerate() {
            let sem_clone = Arc::clone(&semaphore);
            let handle = tokio::spawn(async move {
                let _permit = sem_clone.acquire_owned().await?;
                unit().await
            });
            pending.push(async move { (index, handle.await) });
        }

        let mut outcomes = Vec::with_capacity(total);
        while let Some((index, joined)) = pending.next().await {
            match joined {
                Ok(Ok(value)) => outcomes.push(Some(value)),
                Ok(Err(e)) => {
                    tracing::warn!("Task {}/{} failed: {:#}", index + 1, total, e);
                    outcomes.push(None);
                }
                Err(e) => {
                    tracing::warn!("Task {}/{} aborted: {}", index + 1, total, e);
                    outcomes.push(None);
                }
            }
        }

        tracing::debug!(
            "Task batch finished: {} ok, {} failed",
            outcomes.iter().filter(|o| o.is_some()).count(),
            outcomes.iter().filter(|o| o.is_none()).count()
        );
        outcomes
    }
}
