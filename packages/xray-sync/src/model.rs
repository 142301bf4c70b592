use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One test case, either as declared locally or as stored remotely.
///
/// A record without `key` is local-only; a record with `key` exists (or once
/// existed) in the remote test-management system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRecord {
    pub key: Option<String>,
    pub summary: String,
    pub description: Option<String>,
    #[serde(default)]
    pub requirement_keys: BTreeSet<String>,
    pub unique_identifier: Option<String>,
}

impl TestRecord {
    /// Create a local-only record
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Default::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_requirements<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requirement_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_unique_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.unique_identifier = Some(identifier.into());
        self
    }

    /// Unique identifier, if set and non-empty
    pub fn identifier(&self) -> Option<&str> {
        self.unique_identifier
            .as_deref()
            .filter(|id| !id.is_empty())
    }

    /// Description with a missing value read as empty
    pub fn description_text(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }

    pub fn is_local_only(&self) -> bool {
        self.key.is_none()
    }
}

/// Lifecycle status of a remote test record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestStatus {
    New,
    ReadyForReview,
    InReview,
    Finalized,
    Obsolete,
}

impl TestStatus {
    /// Transitions every created or reconciled record walks through
    pub const FINALIZE_CHAIN: [TestStatus; 3] = [
        TestStatus::ReadyForReview,
        TestStatus::InReview,
        TestStatus::Finalized,
    ];

    /// Status name as known by the remote system
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::New => "In-Draft",
            TestStatus::ReadyForReview => "Ready for Review",
            TestStatus::InReview => "In Review",
            TestStatus::Finalized => "Finalized",
            TestStatus::Obsolete => "Obsolete",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "In-Draft" => Ok(TestStatus::New),
            "Ready for Review" => Ok(TestStatus::ReadyForReview),
            "In Review" => Ok(TestStatus::InReview),
            "Finalized" => Ok(TestStatus::Finalized),
            "Obsolete" => Ok(TestStatus::Obsolete),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Operation a work item performs against the remote system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    MarkedReconcile,
    Obsolete,
    Create,
    Update,
}

impl OperationKind {
    /// Phase order used by the dispatcher
    pub const PHASE_ORDER: [OperationKind; 4] = [
        OperationKind::MarkedReconcile,
        OperationKind::Obsolete,
        OperationKind::Create,
        OperationKind::Update,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::MarkedReconcile => "marked_reconcile",
            OperationKind::Obsolete => "obsolete",
            OperationKind::Create => "create",
            OperationKind::Update => "update",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A test record tagged with the operation to apply to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub kind: OperationKind,
    pub record: TestRecord,
}

impl WorkItem {
    pub fn new(kind: OperationKind, record: TestRecord) -> Self {
        Self { kind, record }
    }
}

/// Outcome of a locally executed test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResultStatus {
    Pass,
    Fail,
    Todo,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Pass => "PASS",
            ResultStatus::Fail => "FAIL",
            ResultStatus::Todo => "TODO",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "PASS" => Ok(ResultStatus::Pass),
            "FAIL" => Ok(ResultStatus::Fail),
            "TODO" => Ok(ResultStatus::Todo),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub key: String,
    pub result: ResultStatus,
}

impl ResultRecord {
    pub fn new(key: impl Into<String>, result: ResultStatus) -> Self {
        Self {
            key: key.into(),
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_names() {
        for status in &[
            TestStatus::New,
            TestStatus::ReadyForReview,
            TestStatus::InReview,
            TestStatus::Finalized,
            TestStatus::Obsolete,
        ] {
            let parsed = TestStatus::from_str(status.as_str()).unwrap();
            assert_eq!(*status, parsed);
        }
        assert!(TestStatus::from_str("Closed").is_err());
    }

    #[test]
    fn test_finalize_chain_ends_in_finalized() {
        assert_eq!(TestStatus::FINALIZE_CHAIN.last(), Some(&TestStatus::Finalized));
        assert!(!TestStatus::FINALIZE_CHAIN.contains(&TestStatus::New));
    }

    #[test]
    fn test_identifier_ignores_empty() {
        let record = TestRecord::new("s1").with_unique_identifier("");
        assert_eq!(record.identifier(), None);

        let record = TestRecord::new("s1").with_unique_identifier("tests/a.py::s1");
        assert_eq!(record.identifier(), Some("tests/a.py::s1"));
    }

    #[test]
    fn test_requirement_order_is_irrelevant() {
        let a = TestRecord::new("s1").with_requirements(["REQ-2", "REQ-1"]);
        let b = TestRecord::new("s1").with_requirements(["REQ-1", "REQ-2", "REQ-1"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_result_status_serde() {
        let record = ResultRecord::new("DEMO-1", ResultStatus::Todo);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"key":"DEMO-1","result":"TODO"}"#);
        assert_eq!(ResultStatus::from_str("FAIL").unwrap(), ResultStatus::Fail);
    }
}
