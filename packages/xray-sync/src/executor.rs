//! Bounded concurrent executor
//!
//! Runs one batch of items with at most `concurrency` in flight. Every item
//! runs to completion; failures (and panics) are recorded in the shared
//! [`FailureCollector`] instead of cancelling siblings.

use crate::aggregator::FailureCollector;
use crate::error::{Result, SyncError};
use crate::model::WorkItem;
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::error;

/// Applies a single work item against the remote system
#[async_trait]
pub trait WorkHandler: Send + Sync + 'static {
    async fn handle(&self, item: WorkItem) -> Result<()>;
}

/// Counts for one executed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct BoundedExecutor {
    concurrency: usize,
}

impl BoundedExecutor {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `op` on every item and wait for all of them.
    ///
    /// A failed item is recorded with the `Debug` rendering of the item as
    /// its subject.
    pub async fn run<T, F, Fut>(
        &self,
        items: Vec<T>,
        mut op: F,
        failures: &FailureCollector,
    ) -> BatchOutcome
    where
        T: Debug,
        F: FnMut(T) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let mut outcome = BatchOutcome {
            attempted: items.len(),
            ..Default::default()
        };
        if items.is_empty() {
            return outcome;
        }

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut subjects = Vec::with_capacity(items.len());
        let mut tasks = Vec::with_capacity(items.len());

        for item in items {
            subjects.push(format!("{:?}", item));
            let work = op(item);
            let semaphore = semaphore.clone();

            tasks.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(anyhow::Error::from)?;
                work.await
            }));
        }

        // Barrier: every task of the batch finishes before we return
        let results = futures::future::join_all(tasks).await;

        for (subject, task_result) in subjects.into_iter().zip(results) {
            match task_result {
                Ok(Ok(())) => outcome.succeeded += 1,
                Ok(Err(e)) => {
                    error!("Work item failed: {} -> {}", e, subject);
                    outcome.failed += 1;
                    failures.push(subject, e);
                }
                Err(join_err) => {
                    error!("Work item panicked: {} -> {}", join_err, subject);
                    outcome.failed += 1;
                    failures.push(subject, SyncError::TaskPanicked(join_err.to_string()));
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Gauge {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        done: AtomicUsize,
    }

    async fn work(gauge: Arc<Gauge>, name: String) -> Result<()> {
        let now = gauge.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        gauge.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        gauge.in_flight.fetch_sub(1, Ordering::SeqCst);
        gauge.done.fetch_add(1, Ordering::SeqCst);

        match name.as_str() {
            "fail" => Err(SyncError::remote("create_record", "rejected")),
            "panic" => panic!("worker blew up"),
            _ => Ok(()),
        }
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let gauge = Arc::new(Gauge::default());
        let failures = FailureCollector::new();
        let items: Vec<String> = (0..40).map(|i| format!("t{i}")).collect();

        let outcome = BoundedExecutor::new(3)
            .run(items, |name| work(gauge.clone(), name), &failures)
            .await;

        assert_eq!(outcome.succeeded, 40);
        assert_eq!(gauge.done.load(Ordering::SeqCst), 40);
        assert!(gauge.peak.load(Ordering::SeqCst) <= 3);
        assert!(failures.is_empty());
    }

    #[tokio::test]
    async fn test_failures_do_not_cancel_siblings() {
        let gauge = Arc::new(Gauge::default());
        let failures = FailureCollector::new();

        let outcome = BoundedExecutor::new(2)
            .run(
                names(&["a", "fail", "b", "panic", "c"]),
                |name| work(gauge.clone(), name),
                &failures,
            )
            .await;

        assert_eq!(
            outcome,
            BatchOutcome {
                attempted: 5,
                succeeded: 3,
                failed: 2
            }
        );
        let recorded = failures.snapshot();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].subject, "\"fail\"");
        assert!(recorded[0].error.contains("rejected"));
        assert!(recorded[1].error.starts_with("Worker task panicked"));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let failures = FailureCollector::new();
        let outcome = BoundedExecutor::new(0)
            .run(Vec::<String>::new(), |_| async { Ok(()) }, &failures)
            .await;
        assert_eq!(outcome, BatchOutcome::default());
    }
}
