use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinError;

/// Default cap on concurrently in-flight external calls per run.
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Error value produced for a single unit of work; never propagated as a
/// batch failure.
#[derive(Error, Debug)]
pub enum UnitError {
    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task was cancelled")]
    Cancelled,
}

pub type UnitResult<T> = std::result::Result<T, UnitError>;

/// Runs batches of independent asynchronous units with a shared concurrency
/// budget.
///
/// One executor (one semaphore) is created per top-level analysis run and
/// injected into every component that fans out work, so AI calls, tracker
/// searches, and recursive child-build walks all draw from the same budget.
///
/// Guarantees for both dispatch modes:
/// - output order matches input order, whatever the completion order;
/// - a unit that panics yields an error value at its index and the rest of
///   the batch still completes.
#[derive(Clone)]
pub struct BoundedExecutor {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl BoundedExecutor {
    pub fn new(limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit.max(1))),
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run units with one budget slot each: at most `limit` execute at a
    /// time, the rest wait for a free slot.
    ///
    /// Invariant: a unit dispatched here must not fan out through this same
    /// executor — it would hold its slot while waiting for slots, and enough
    /// such units exhaust the semaphore. Nested fan-outs go through
    /// [`run_nested`](Self::run_nested).
    pub async fn run_bounded<T, Fut>(&self, units: Vec<Fut>) -> Vec<UnitResult<T>>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let handles: Vec<_> = units
            .into_iter()
            .map(|unit| {
                let semaphore = Arc::clone(&self.semaphore);
                tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .expect("executor semaphore is never closed");
                    unit.await
                })
            })
            .collect();

        Self::collect(handles).await
    }

    /// Run units without taking budget slots, keeping the ordering and
    /// isolation guarantees. For units that are themselves fan-outs: their
    /// own external calls acquire slots individually, so the global cap on
    /// concurrent external work still holds.
    pub async fn run_nested<T, Fut>(&self, units: Vec<Fut>) -> Vec<UnitResult<T>>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let handles: Vec<_> = units.into_iter().map(tokio::spawn).collect();
        Self::collect(handles).await
    }

    async fn collect<T>(handles: Vec<tokio::task::JoinHandle<T>>) -> Vec<UnitResult<T>> {
        join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.map_err(Self::join_error))
            .collect()
    }

    fn join_error(err: JoinError) -> UnitError {
        if err.is_panic() {
            let payload = err.into_panic();
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            };
            UnitError::Panicked(message)
        } else {
            UnitError::Cancelled
        }
    }
}

impl Default for BoundedExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENCY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_bounded_concurrency_never_exceeds_limit() {
        let executor = BoundedExecutor::new(10);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let units: Vec<_> = (0..1000)
            .map(|i| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_micros(100)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    i
                }
            })
            .collect();

        let results = executor.run_bounded(units).await;

        assert_eq!(results.len(), 1000);
        assert!(peak.load(Ordering::SeqCst) <= 10);
        for (i, result) in results.into_iter().enumerate() {
            assert_eq!(result.unwrap(), i);
        }
    }

    #[tokio::test]
    async fn test_output_order_matches_input_order() {
        let executor = BoundedExecutor::new(10);

        // Later units finish first; output order must still be input order.
        let units: Vec<_> = (0u64..8)
            .map(|i| async move {
                tokio::time::sleep(Duration::from_millis(40 - i * 5)).await;
                i
            })
            .collect();

        let results = executor.run_bounded(units).await;
        let values: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn test_panicking_unit_does_not_poison_the_batch() {
        let executor = BoundedExecutor::new(4);

        let units: Vec<_> = (0..5)
            .map(|i| async move {
                if i == 2 {
                    panic!("unit {i} exploded");
                }
                i
            })
            .collect();

        let results = executor.run_bounded(units).await;

        assert_eq!(results.len(), 5);
        for (i, result) in results.iter().enumerate() {
            if i == 2 {
                match result {
                    Err(UnitError::Panicked(msg)) => assert!(msg.contains("exploded")),
                    other => panic!("expected panic error, got {other:?}"),
                }
            } else {
                assert_eq!(*result.as_ref().unwrap(), i);
            }
        }
    }

    #[tokio::test]
    async fn test_nested_fan_out_does_not_deadlock_the_shared_budget() {
        // limit 1: if nested units held slots across their inner fan-out,
        // this would hang.
        let executor = BoundedExecutor::new(1);

        let outer: Vec<_> = (0..3)
            .map(|i| {
                let executor = executor.clone();
                async move {
                    let inner = executor.run_bounded(vec![async move { i * 10 }]).await;
                    inner.into_iter().next().unwrap().unwrap()
                }
            })
            .collect();

        let results = tokio::time::timeout(
            Duration::from_secs(5),
            executor.run_nested(outer),
        )
        .await
        .expect("nested fan-out deadlocked");

        let values: Vec<i32> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![0, 10, 20]);
    }

    #[tokio::test]
    async fn test_empty_batch_returns_empty() {
        let executor = BoundedExecutor::default();
        let results: Vec<UnitResult<u8>> =
            executor.run_bounded(Vec::<std::future::Ready<u8>>::new()).await;
        assert!(results.is_empty());
        assert_eq!(executor.limit(), DEFAULT_MAX_CONCURRENCY);
    }
}
