//! Bounded fan-out of independent sub-queries.

use std::future::Future;
use std::sync::Arc;

use log::error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{ErrorCode, NetTraceError, NetTraceResult};

/// Runs a set of keyed tasks with at most `width` of them in flight.
///
/// Each key gets its own spawned task; results come back paired with their
/// key in completion order, so callers must not rely on ordering.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    width: usize,
}

impl ConcurrencyLimiter {
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(width)),
            width,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Spawn `task(key)` for every key and collect every outcome.
    ///
    /// A task that panics is logged and dropped from the output.
    pub async fn fan_out<K, T, F, Fut>(&self, keys: Vec<K>, task: F) -> Vec<(K, NetTraceResult<T>)>
    where
        K: Clone + Send + 'static,
        T: Send + 'static,
        F: Fn(K) -> Fut,
        Fut: Future<Output = NetTraceResult<T>> + Send + 'static,
    {
        let mut set = JoinSet::new();
        let total = keys.len();

        for key in keys {
            let semaphore = self.semaphore.clone();
            let fut = task(key.clone());
            set.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => fut.await,
                    Err(e) => Err(NetTraceError::system(
                        ErrorCode::Internal,
                        "concurrency limiter closed",
                    )
                    .with_source(e)),
                };
                (key, outcome)
            });
        }

        let mut results = Vec::with_capacity(total);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(pair) => results.push(pair),
                Err(e) => error!("[LIMITER] Sub-query task failed to complete: {e}"),
            }
        }
        results
    }
}
