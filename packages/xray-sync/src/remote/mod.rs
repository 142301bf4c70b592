//! Remote test-management client interface
//!
//! The sync engine is protocol-agnostic: anything implementing
//! [`RemoteTestClient`] (and [`ExecutionClient`] for result upload) can be
//! driven by it. [`memory::InMemoryRemote`] is the in-process implementation.

pub mod memory;

use crate::config::CustomFieldValue;
use crate::error::Result;
use crate::model::{ResultStatus, TestRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Test repository folder identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FolderId(pub i64);

impl std::fmt::Display for FolderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomField {
    pub id: String,
    pub name: String,
}

/// Filter for the bulk inventory query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryQuery {
    pub project_key: String,
    pub reporter: String,
    /// Only tests filed under this repository folder
    pub folder: String,
    /// Custom field name -> required value(s)
    pub custom_field_filters: BTreeMap<String, CustomFieldValue>,
    /// Page size hint; implementations must still return every match
    pub page_size: usize,
}

/// A single record fetched by key, with its current remote status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTest {
    pub record: TestRecord,
    pub status: String,
}

/// Field payload for record creation and field updates.
///
/// Only `Some` fields are written; `custom_fields` is keyed by remote field id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub custom_fields: BTreeMap<String, serde_json::Value>,
}

/// Issue types used to group tests for result reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackingIssueKind {
    TestPlan,
    TestExecution,
}

impl TrackingIssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingIssueKind::TestPlan => "Test Plan",
            TrackingIssueKind::TestExecution => "Test Execution",
        }
    }
}

impl std::fmt::Display for TrackingIssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One run of a test inside a test execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRun {
    pub id: String,
    pub execution_key: String,
}

/// Capabilities the sync engine needs from the remote system
#[async_trait]
pub trait RemoteTestClient: Send + Sync {
    /// All non-obsolete tests matching the query
    async fn query_inventory(&self, query: &InventoryQuery) -> Result<Vec<TestRecord>>;

    async fn fetch_one(&self, key: &str) -> Result<RemoteTest>;

    async fn list_custom_fields(&self) -> Result<Vec<CustomField>>;

    /// Create a test record, returning its assigned key
    async fn create_record(&self, fields: &TestFields) -> Result<String>;

    async fn set_status(&self, key: &str, status: &str) -> Result<()>;

    async fn update_fields(&self, key: &str, fields: &TestFields) -> Result<()>;

    async fn link_to_requirement(&self, key: &str, requirement_key: &str) -> Result<()>;

    /// Remove every requirement link of the record
    async fn unlink_all(&self, key: &str) -> Result<()>;

    /// Get-or-create a repository folder; `None` parent is the repository root
    async fn ensure_folder(&self, name: &str, parent: Option<FolderId>) -> Result<FolderId>;

    async fn move_into_folder(&self, key: &str, folder: FolderId) -> Result<()>;

    async fn remove_from_folder(&self, key: &str, folder: FolderId) -> Result<()>;
}

/// Result-reporting capabilities
#[async_trait]
pub trait ExecutionClient: RemoteTestClient {
    async fn find_tracking_issue(
        &self,
        kind: TrackingIssueKind,
        summary: &str,
    ) -> Result<Option<String>>;

    async fn create_tracking_issue(
        &self,
        kind: TrackingIssueKind,
        fields: &TestFields,
    ) -> Result<String>;

    /// Keys of the tracking issues of `kind` that already contain the test
    async fn tracking_issues_of_test(
        &self,
        kind: TrackingIssueKind,
        test_key: &str,
    ) -> Result<Vec<String>>;

    async fn add_tests(
        &self,
        kind: TrackingIssueKind,
        issue_key: &str,
        test_keys: &[String],
    ) -> Result<()>;

    async fn add_execution_to_plan(&self, execution_key: &str, plan_key: &str) -> Result<()>;

    async fn test_runs(&self, test_key: &str) -> Result<Vec<TestRun>>;

    async fn set_test_run_status(&self, run_id: &str, status: ResultStatus) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_serialize_only_present_values() {
        let fields = TestFields {
            summary: Some("test_login".to_string()),
            labels: Some(vec![]),
            ..Default::default()
        };

        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json, serde_json::json!({"summary": "test_login", "labels": []}));
    }

    #[test]
    fn test_tracking_issue_names() {
        assert_eq!(TrackingIssueKind::TestPlan.to_string(), "Test Plan");
        assert_eq!(TrackingIssueKind::TestExecution.to_string(), "Test Execution");
    }
}
