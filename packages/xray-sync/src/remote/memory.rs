use super::{
    CustomField, ExecutionClient, FolderId, InventoryQuery, RemoteTest, RemoteTestClient,
    TestFields, TestRun, TrackingIssueKind,
};
use crate::error::{Result, SyncError};
use crate::model::{ResultStatus, TestRecord, TestStatus};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A mutating call observed by [`InMemoryRemote`], in call order
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    CreateRecord { key: String, fields: TestFields },
    SetStatus { key: String, status: String },
    UpdateFields { key: String, fields: TestFields },
    Link { key: String, requirement_key: String },
    UnlinkAll { key: String },
    CreateFolder { name: String, parent: Option<FolderId> },
    MoveIntoFolder { key: String, folder: FolderId },
    RemoveFromFolder { key: String, folder: FolderId },
    CreateTrackingIssue { kind: TrackingIssueKind, key: String, summary: String },
    AddTests { kind: TrackingIssueKind, issue_key: String, test_keys: Vec<String> },
    AddExecutionToPlan { execution_key: String, plan_key: String },
    SetTestRunStatus { run_id: String, status: ResultStatus },
}

impl RemoteCall {
    /// Record key the call mutates, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            RemoteCall::CreateRecord { key, .. }
            | RemoteCall::SetStatus { key, .. }
            | RemoteCall::UpdateFields { key, .. }
            | RemoteCall::Link { key, .. }
            | RemoteCall::UnlinkAll { key }
            | RemoteCall::MoveIntoFolder { key, .. }
            | RemoteCall::RemoveFromFolder { key, .. } => Some(key),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredTest {
    record: TestRecord,
    status: String,
    /// Visible to inventory queries
    tracked: bool,
    folders: BTreeSet<FolderId>,
    extra_fields: TestFields,
}

#[derive(Debug, Clone)]
struct StoredFolder {
    id: FolderId,
    name: String,
    parent: Option<FolderId>,
}

#[derive(Debug, Clone)]
struct FailureRule {
    operation: String,
    subject: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_issue: u64,
    next_folder: i64,
    tests: BTreeMap<String, StoredTest>,
    folders: Vec<StoredFolder>,
    custom_fields: Vec<CustomField>,
    tracking: BTreeMap<String, (TrackingIssueKind, String)>,
    members: BTreeMap<String, BTreeSet<String>>,
    plan_executions: BTreeMap<String, BTreeSet<String>>,
    run_status: BTreeMap<String, ResultStatus>,
    failures: Vec<FailureRule>,
    queries: Vec<InventoryQuery>,
    calls: Vec<RemoteCall>,
}

/// In-process remote test-management system.
///
/// Stores records in memory, logs every mutating call and can be told to fail
/// specific operations. Keys are allocated as `<PROJECT>-<n>`.
pub struct InMemoryRemote {
    project_key: String,
    state: Arc<Mutex<MemoryState>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InMemoryRemote {
    pub fn new(project_key: impl Into<String>) -> Self {
        Self {
            project_key: project_key.into(),
            state: Arc::new(Mutex::new(MemoryState {
                next_issue: 1,
                next_folder: 1,
                ..Default::default()
            })),
            latency: None,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Delay every call, to make concurrency observable
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_custom_field(self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.state.lock().custom_fields.push(CustomField {
            id: id.into(),
            name: name.into(),
        });
        self
    }

    /// Store a record that inventory queries return
    pub fn seed_test(&self, record: TestRecord, status: TestStatus) -> String {
        self.insert(record, status.as_str().to_string(), true)
    }

    /// Store a record that only `fetch_one` can see
    pub fn seed_untracked(&self, record: TestRecord, status: &str) -> String {
        self.insert(record, status.to_string(), false)
    }

    fn insert(&self, mut record: TestRecord, status: String, tracked: bool) -> String {
        let mut state = self.state.lock();
        let key = match record.key.clone() {
            Some(key) => key,
            None => {
                let key = format!("{}-{}", self.project_key, state.next_issue);
                state.next_issue += 1;
                key
            }
        };
        record.key = Some(key.clone());
        state.tests.insert(
            key.clone(),
            StoredTest {
                record,
                status,
                tracked,
                folders: BTreeSet::new(),
                extra_fields: TestFields::default(),
            },
        );
        key
    }

    /// Fail every call to `operation` (trait method name). With `subject`,
    /// only calls for that key (or summary, for `create_record`) fail.
    pub fn fail_on(&self, operation: &str, subject: Option<&str>) {
        self.state.lock().failures.push(FailureRule {
            operation: operation.to_string(),
            subject: subject.map(str::to_string),
        });
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().calls.clone()
    }

    pub fn queries(&self) -> Vec<InventoryQuery> {
        self.state.lock().queries.clone()
    }

    pub fn record(&self, key: &str) -> Option<TestRecord> {
        self.state.lock().tests.get(key).map(|t| t.record.clone())
    }

    pub fn status(&self, key: &str) -> Option<String> {
        self.state.lock().tests.get(key).map(|t| t.status.clone())
    }

    /// Fields written beyond the record itself (assignee, reporter, labels, custom fields)
    pub fn extra_fields(&self, key: &str) -> Option<TestFields> {
        self.state.lock().tests.get(key).map(|t| t.extra_fields.clone())
    }

    pub fn folders_of(&self, key: &str) -> BTreeSet<FolderId> {
        self.state
            .lock()
            .tests
            .get(key)
            .map(|t| t.folders.clone())
            .unwrap_or_default()
    }

    pub fn folder_by_name(&self, name: &str) -> Option<FolderId> {
        self.state
            .lock()
            .folders
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.id)
    }

    pub fn tracking_members(&self, issue_key: &str) -> BTreeSet<String> {
        self.state
            .lock()
            .members
            .get(issue_key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn plan_executions(&self, plan_key: &str) -> BTreeSet<String> {
        self.state
            .lock()
            .plan_executions
            .get(plan_key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn run_status(&self, run_id: &str) -> Option<ResultStatus> {
        self.state.lock().run_status.get(run_id).copied()
    }

    /// Highest number of calls observed in flight at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, operation: &str, subject: Option<&str>) -> Result<InFlightGuard<'_>> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        let guard = InFlightGuard(&self.in_flight);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let state = self.state.lock();
        let injected = state.failures.iter().any(|rule| {
            rule.operation == operation
                && match (&rule.subject, subject) {
                    (None, _) => true,
                    (Some(expected), Some(actual)) => expected.eq_ignore_ascii_case(actual),
                    (Some(_), None) => false,
                }
        });
        if injected {
            return Err(SyncError::remote(operation, "injected failure"));
        }
        Ok(guard)
    }

    fn with_test<T>(
        &self,
        operation: &str,
        key: &str,
        f: impl FnOnce(&mut StoredTest) -> T,
    ) -> Result<T> {
        let mut state = self.state.lock();
        state
            .tests
            .get_mut(key)
            .map(f)
            .ok_or_else(|| SyncError::remote(operation, format!("issue {} does not exist", key)))
    }

    fn log(&self, call: RemoteCall) {
        self.state.lock().calls.push(call);
    }
}

/// Seeded records carry no custom fields and match every filter.
fn matches_filters(stored: &StoredTest, query: &InventoryQuery, catalog: &[CustomField]) -> bool {
    use crate::config::CustomFieldValue;

    query.custom_field_filters.iter().all(|(name, expected)| {
        let Some(field) = catalog.iter().find(|f| &f.name == name) else {
            return false;
        };
        let Some(actual) = stored.extra_fields.custom_fields.get(&field.id) else {
            return true;
        };
        let stored_values: Vec<&str> = match actual {
            serde_json::Value::Array(items) => items
                .iter()
                .filter_map(|item| item.get("value").and_then(|v| v.as_str()))
                .collect(),
            other => other
                .get("value")
                .and_then(|v| v.as_str())
                .into_iter()
                .collect(),
        };
        match expected {
            CustomFieldValue::Single(value) => stored_values.contains(&value.as_str()),
            CustomFieldValue::Multi(values) if values.is_empty() => true,
            CustomFieldValue::Multi(values) => values
                .iter()
                .any(|v| stored_values.contains(&v.as_str())),
        }
    })
}

#[async_trait]
impl RemoteTestClient for InMemoryRemote {
    async fn query_inventory(&self, query: &InventoryQuery) -> Result<Vec<TestRecord>> {
        let _guard = self.enter("query_inventory", None).await?;
        let mut state = self.state.lock();
        state.queries.push(query.clone());
        Ok(state
            .tests
            .values()
            .filter(|t| t.tracked && t.status != TestStatus::Obsolete.as_str())
            .filter(|t| matches_filters(t, query, &state.custom_fields))
            .map(|t| t.record.clone())
            .collect())
    }

    async fn fetch_one(&self, key: &str) -> Result<RemoteTest> {
        let _guard = self.enter("fetch_one", Some(key)).await?;
        self.with_test("fetch_one", key, |t| RemoteTest {
            record: t.record.clone(),
            status: t.status.clone(),
        })
    }

    async fn list_custom_fields(&self) -> Result<Vec<CustomField>> {
        let _guard = self.enter("list_custom_fields", None).await?;
        Ok(self.state.lock().custom_fields.clone())
    }

    async fn create_record(&self, fields: &TestFields) -> Result<String> {
        let _guard = self
            .enter("create_record", fields.summary.as_deref())
            .await?;
        let record = TestRecord {
            key: None,
            summary: fields.summary.clone().unwrap_or_default(),
            description: fields.description.clone(),
            requirement_keys: BTreeSet::new(),
            unique_identifier: fields.unique_identifier.clone(),
        };
        let key = self.insert(record, TestStatus::New.as_str().to_string(), true);
        self.with_test("create_record", &key, |t| {
            t.extra_fields = TestFields {
                summary: None,
                description: None,
                unique_identifier: None,
                ..fields.clone()
            };
        })?;
        self.log(RemoteCall::CreateRecord {
            key: key.clone(),
            fields: fields.clone(),
        });
        Ok(key)
    }

    async fn set_status(&self, key: &str, status: &str) -> Result<()> {
        let _guard = self.enter("set_status", Some(key)).await?;
        self.with_test("set_status", key, |t| t.status = status.to_string())?;
        self.log(RemoteCall::SetStatus {
            key: key.to_string(),
            status: status.to_string(),
        });
        Ok(())
    }

    async fn update_fields(&self, key: &str, fields: &TestFields) -> Result<()> {
        let _guard = self.enter("update_fields", Some(key)).await?;
        self.with_test("update_fields", key, |t| {
            if let Some(summary) = &fields.summary {
                t.record.summary = summary.clone();
            }
            if fields.description.is_some() {
                t.record.description = fields.description.clone();
            }
            if fields.unique_identifier.is_some() {
                t.record.unique_identifier = fields.unique_identifier.clone();
            }
            if fields.assignee.is_some() {
                t.extra_fields.assignee = fields.assignee.clone();
            }
            if fields.reporter.is_some() {
                t.extra_fields.reporter = fields.reporter.clone();
            }
            if fields.labels.is_some() {
                t.extra_fields.labels = fields.labels.clone();
            }
            t.extra_fields
                .custom_fields
                .extend(fields.custom_fields.clone());
        })?;
        self.log(RemoteCall::UpdateFields {
            key: key.to_string(),
            fields: fields.clone(),
        });
        Ok(())
    }

    async fn link_to_requirement(&self, key: &str, requirement_key: &str) -> Result<()> {
        let _guard = self.enter("link_to_requirement", Some(key)).await?;
        self.with_test("link_to_requirement", key, |t| {
            t.record.requirement_keys.insert(requirement_key.to_string());
        })?;
        self.log(RemoteCall::Link {
            key: key.to_string(),
            requirement_key: requirement_key.to_string(),
        });
        Ok(())
    }

    async fn unlink_all(&self, key: &str) -> Result<()> {
        let _guard = self.enter("unlink_all", Some(key)).await?;
        self.with_test("unlink_all", key, |t| t.record.requirement_keys.clear())?;
        self.log(RemoteCall::UnlinkAll {
            key: key.to_string(),
        });
        Ok(())
    }

    async fn ensure_folder(&self, name: &str, parent: Option<FolderId>) -> Result<FolderId> {
        let _guard = self.enter("ensure_folder", Some(name)).await?;
        let mut state = self.state.lock();
        if let Some(existing) = state
            .folders
            .iter()
            .find(|f| f.name == name && f.parent == parent)
        {
            return Ok(existing.id);
        }

        let id = FolderId(state.next_folder);
        state.next_folder += 1;
        state.folders.push(StoredFolder {
            id,
            name: name.to_string(),
            parent,
        });
        state.calls.push(RemoteCall::CreateFolder {
            name: name.to_string(),
            parent,
        });
        Ok(id)
    }

    async fn move_into_folder(&self, key: &str, folder: FolderId) -> Result<()> {
        let _guard = self.enter("move_into_folder", Some(key)).await?;
        self.with_test("move_into_folder", key, |t| {
            t.folders.insert(folder);
            t.tracked = true;
        })?;
        self.log(RemoteCall::MoveIntoFolder {
            key: key.to_string(),
            folder,
        });
        Ok(())
    }

    async fn remove_from_folder(&self, key: &str, folder: FolderId) -> Result<()> {
        let _guard = self.enter("remove_from_folder", Some(key)).await?;
        self.with_test("remove_from_folder", key, |t| {
            t.folders.remove(&folder);
        })?;
        self.log(RemoteCall::RemoveFromFolder {
            key: key.to_string(),
            folder,
        });
        Ok(())
    }
}

#[async_trait]
impl ExecutionClient for InMemoryRemote {
    async fn find_tracking_issue(
        &self,
        kind: TrackingIssueKind,
        summary: &str,
    ) -> Result<Option<String>> {
        let _guard = self.enter("find_tracking_issue", Some(summary)).await?;
        Ok(self
            .state
            .lock()
            .tracking
            .iter()
            .find(|(_, (k, s))| *k == kind && s == summary)
            .map(|(key, _)| key.clone()))
    }

    async fn create_tracking_issue(
        &self,
        kind: TrackingIssueKind,
        fields: &TestFields,
    ) -> Result<String> {
        let summary = fields.summary.clone().unwrap_or_default();
        let _guard = self
            .enter("create_tracking_issue", Some(&summary))
            .await?;
        let mut state = self.state.lock();
        let key = format!("{}-{}", self.project_key, state.next_issue);
        state.next_issue += 1;
        state
            .tracking
            .insert(key.clone(), (kind, summary.clone()));
        state.calls.push(RemoteCall::CreateTrackingIssue {
            kind,
            key: key.clone(),
            summary,
        });
        Ok(key)
    }

    async fn tracking_issues_of_test(
        &self,
        kind: TrackingIssueKind,
        test_key: &str,
    ) -> Result<Vec<String>> {
        let _guard = self
            .enter("tracking_issues_of_test", Some(test_key))
            .await?;
        let state = self.state.lock();
        Ok(state
            .members
            .iter()
            .filter(|(issue, tests)| {
                tests.contains(test_key)
                    && state.tracking.get(*issue).map(|(k, _)| *k) == Some(kind)
            })
            .map(|(issue, _)| issue.clone())
            .collect())
    }

    async fn add_tests(
        &self,
        kind: TrackingIssueKind,
        issue_key: &str,
        test_keys: &[String],
    ) -> Result<()> {
        let subject = test_keys.first().map(String::as_str);
        let _guard = self.enter("add_tests", subject).await?;
        let mut state = self.state.lock();
        state
            .members
            .entry(issue_key.to_string())
            .or_default()
            .extend(test_keys.iter().cloned());
        state.calls.push(RemoteCall::AddTests {
            kind,
            issue_key: issue_key.to_string(),
            test_keys: test_keys.to_vec(),
        });
        Ok(())
    }

    async fn add_execution_to_plan(&self, execution_key: &str, plan_key: &str) -> Result<()> {
        let _guard = self
            .enter("add_execution_to_plan", Some(execution_key))
            .await?;
        let mut state = self.state.lock();
        state
            .plan_executions
            .entry(plan_key.to_string())
            .or_default()
            .insert(execution_key.to_string());
        state.calls.push(RemoteCall::AddExecutionToPlan {
            execution_key: execution_key.to_string(),
            plan_key: plan_key.to_string(),
        });
        Ok(())
    }

    async fn test_runs(&self, test_key: &str) -> Result<Vec<TestRun>> {
        let _guard = self.enter("test_runs", Some(test_key)).await?;
        let state = self.state.lock();
        Ok(state
            .members
            .iter()
            .filter(|(issue, tests)| {
                tests.contains(test_key)
                    && state.tracking.get(*issue).map(|(k, _)| *k)
                        == Some(TrackingIssueKind::TestExecution)
            })
            .map(|(issue, _)| TestRun {
                id: format!("{}:{}", issue, test_key),
                execution_key: issue.clone(),
            })
            .collect())
    }

    async fn set_test_run_status(&self, run_id: &str, status: ResultStatus) -> Result<()> {
        let _guard = self.enter("set_test_run_status", Some(run_id)).await?;
        let mut state = self.state.lock();
        state.run_status.insert(run_id.to_string(), status);
        state.calls.push(RemoteCall::SetTestRunStatus {
            run_id: run_id.to_string(),
            status,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_allocates_project_keys() {
        let remote = InMemoryRemote::new("DEMO");
        let fields = TestFields {
            summary: Some("test_login".to_string()),
            ..Default::default()
        };

        let first = remote.create_record(&fields).await.unwrap();
        let second = remote.create_record(&fields).await.unwrap();

        assert_eq!(first, "DEMO-1");
        assert_eq!(second, "DEMO-2");
        assert_eq!(remote.status(&first).as_deref(), Some("In-Draft"));
    }

    #[tokio::test]
    async fn test_ensure_folder_is_idempotent() {
        let remote = InMemoryRemote::new("DEMO");
        let a = remote.ensure_folder("Automation Test", None).await.unwrap();
        let b = remote.ensure_folder("Automation Test", None).await.unwrap();
        let child = remote.ensure_folder("Obsolete", Some(a)).await.unwrap();

        assert_eq!(a, b);
        assert_ne!(a, child);
        let creates = remote
            .calls()
            .into_iter()
            .filter(|c| matches!(c, RemoteCall::CreateFolder { .. }))
            .count();
        assert_eq!(creates, 2);
    }

    #[tokio::test]
    async fn test_inventory_hides_obsolete_and_untracked() {
        let remote = InMemoryRemote::new("DEMO");
        remote.seed_test(TestRecord::new("live"), TestStatus::Finalized);
        remote.seed_test(TestRecord::new("gone"), TestStatus::Obsolete);
        remote.seed_untracked(TestRecord::new("external"), "Finalized");

        let query = InventoryQuery {
            project_key: "DEMO".to_string(),
            reporter: "bot".to_string(),
            folder: "Automation Test".to_string(),
            custom_field_filters: BTreeMap::new(),
            page_size: 100,
        };
        let inventory = remote.query_inventory(&query).await.unwrap();

        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory[0].summary, "live");
        assert_eq!(remote.queries(), vec![query]);
    }

    #[tokio::test]
    async fn test_injected_failure_matches_subject_case_insensitively() {
        let remote = InMemoryRemote::new("DEMO");
        let key = remote.seed_test(TestRecord::new("s1"), TestStatus::Finalized);
        remote.fail_on("set_status", Some("demo-1"));

        let err = remote.set_status(&key, "Obsolete").await.unwrap_err();
        assert!(err.to_string().contains("injected failure"));
        assert_eq!(remote.status(&key).as_deref(), Some("Finalized"));
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_issue_is_remote_error() {
        let remote = InMemoryRemote::new("DEMO");
        let err = remote.fetch_one("DEMO-404").await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteOperation { .. }));
    }
}
