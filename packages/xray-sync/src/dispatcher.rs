use crate::aggregator::FailureCollector;
use crate::executor::{BatchOutcome, BoundedExecutor, WorkHandler};
use crate::model::{OperationKind, TestRecord, WorkItem};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Outcome of one dispatched phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseReport {
    pub kind: OperationKind,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

impl PhaseReport {
    fn new(kind: OperationKind, outcome: BatchOutcome, duration_ms: u64) -> Self {
        Self {
            kind,
            attempted: outcome.attempted,
            succeeded: outcome.succeeded,
            failed: outcome.failed,
            duration_ms,
        }
    }
}

/// Runs phases one after another; each phase fans out on the bounded
/// executor and drains completely before the next one starts.
///
/// Failures never stop later phases. They accumulate in the collector and
/// are reported by the caller once every phase has run.
pub struct PhasedDispatcher {
    executor: BoundedExecutor,
}

impl PhasedDispatcher {
    pub fn new(concurrency: usize) -> Self {
        Self {
            executor: BoundedExecutor::new(concurrency),
        }
    }

    pub async fn dispatch<H>(
        &self,
        handler: Arc<H>,
        phases: Vec<(OperationKind, Vec<TestRecord>)>,
        failures: &FailureCollector,
    ) -> Vec<PhaseReport>
    where
        H: WorkHandler + ?Sized,
    {
        let mut reports = Vec::with_capacity(phases.len());

        for (phase_idx, (kind, records)) in phases.into_iter().enumerate() {
            let start = Instant::now();
            info!(
                "Phase {} ({}) - {} items, concurrency {}",
                phase_idx + 1,
                kind,
                records.len(),
                self.executor.concurrency()
            );

            let outcome = self
                .executor
                .run(
                    records,
                    |record| {
                        let handler = handler.clone();
                        async move { handler.handle(WorkItem::new(kind, record)).await }
                    },
                    failures,
                )
                .await;

            let report = PhaseReport::new(kind, outcome, duration_ms(start.elapsed()));
            if report.failed > 0 {
                warn!(
                    "Phase {} ({}) finished with {} of {} items failed",
                    phase_idx + 1,
                    kind,
                    report.failed,
                    report.attempted
                );
            } else {
                info!(
                    "Phase {} ({}) completed - {} items in {}ms",
                    phase_idx + 1,
                    kind,
                    report.succeeded,
                    report.duration_ms
                );
            }
            reports.push(report);
        }

        reports
    }
}

/// Whole milliseconds, saturating at `u64::MAX`
pub(crate) fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
