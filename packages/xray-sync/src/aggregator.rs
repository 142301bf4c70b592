use crate::error::{Result, SyncError};
use parking_lot::Mutex;

/// One failed work item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Rendering of the record the work item operated on
    pub subject: String,
    pub error: String,
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.error, self.subject)
    }
}

/// Thread-safe sink for work item failures across every phase of a run
#[derive(Debug, Default)]
pub struct FailureCollector {
    failures: Mutex<Vec<Failure>>,
}

impl FailureCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, subject: impl Into<String>, error: impl std::fmt::Display) {
        self.failures.lock().push(Failure {
            subject: subject.into(),
            error: error.to_string(),
        });
    }

    pub fn len(&self) -> usize {
        self.failures.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<Failure> {
        self.failures.lock().clone()
    }

    /// `Ok` if nothing failed, otherwise one error listing every failure
    pub fn finish(&self) -> Result<()> {
        let failures = std::mem::take(&mut *self.failures.lock());
        if failures.is_empty() {
            return Ok(());
        }

        let details = failures
            .iter()
            .map(Failure::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        Err(SyncError::Aggregated {
            failed: failures.len(),
            details,
        })
    }
}
