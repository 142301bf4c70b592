//! Result upload
//!
//! Reports local execution results into a test plan / test execution pair.
//! Both tracking issues are looked up by summary and created when missing.

use crate::aggregator::FailureCollector;
use crate::context::SyncContext;
use crate::error::Result;
use crate::executor::{BatchOutcome, BoundedExecutor};
use crate::model::ResultRecord;
use crate::remote::{ExecutionClient, TestFields, TrackingIssueKind};
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub test_plan_key: String,
    pub test_execution_key: String,
    pub plan_membership: BatchOutcome,
    pub execution_membership: BatchOutcome,
    pub run_statuses: BatchOutcome,
}

pub async fn upload_results<C>(
    ctx: Arc<SyncContext<C>>,
    test_plan_name: &str,
    test_execution_name: &str,
    results: Vec<ResultRecord>,
) -> Result<UploadReport>
where
    C: ExecutionClient + ?Sized + 'static,
{
    ctx.begin_run();
    let test_plan_key =
        get_or_create_tracking_issue(&ctx, TrackingIssueKind::TestPlan, test_plan_name).await?;
    let test_execution_key = get_or_create_tracking_issue(
        &ctx,
        TrackingIssueKind::TestExecution,
        test_execution_name,
    )
    .await?;

    let test_keys: Vec<String> = ctx
        .query_inventory()
        .await?
        .into_iter()
        .filter_map(|record| record.key)
        .collect();

    let executor = BoundedExecutor::new(ctx.config.concurrency);
    let failures = FailureCollector::new();

    info!(
        "Adding {} tests to {} {}",
        test_keys.len(),
        TrackingIssueKind::TestPlan,
        test_plan_key
    );
    let plan_membership = executor
        .run(
            test_keys.clone(),
            |test_key| {
                add_if_absent(
                    ctx.clone(),
                    TrackingIssueKind::TestPlan,
                    test_plan_key.clone(),
                    test_key,
                )
            },
            &failures,
        )
        .await;

    info!(
        "Adding {} tests to {} {}",
        test_keys.len(),
        TrackingIssueKind::TestExecution,
        test_execution_key
    );
    let execution_membership = executor
        .run(
            test_keys,
            |test_key| {
                add_if_absent(
                    ctx.clone(),
                    TrackingIssueKind::TestExecution,
                    test_execution_key.clone(),
                    test_key,
                )
            },
            &failures,
        )
        .await;

    if let Err(e) = ctx
        .client
        .add_execution_to_plan(&test_execution_key, &test_plan_key)
        .await
    {
        error!(
            "Linking {} to {} failed: {}",
            test_execution_key, test_plan_key, e
        );
        failures.push(
            format!("{} -> {}", test_execution_key, test_plan_key),
            e,
        );
    }

    info!(
        "Uploading {} results to {}",
        results.len(),
        test_execution_key
    );
    let run_statuses = executor
        .run(
            results,
            |result| set_run_status(ctx.clone(), test_execution_key.clone(), result),
            &failures,
        )
        .await;

    failures.finish()?;

    Ok(UploadReport {
        test_plan_key,
        test_execution_key,
        plan_membership,
        execution_membership,
        run_statuses,
    })
}

async fn get_or_create_tracking_issue<C>(
    ctx: &SyncContext<C>,
    kind: TrackingIssueKind,
    summary: &str,
) -> Result<String>
where
    C: ExecutionClient + ?Sized,
{
    if let Some(key) = ctx.client.find_tracking_issue(kind, summary).await? {
        debug!("Reusing {} {} '{}'", kind, key, summary);
        return Ok(key);
    }

    let fields = TestFields {
        summary: Some(summary.to_string()),
        assignee: Some(ctx.user.clone()),
        reporter: Some(ctx.user.clone()),
        ..Default::default()
    };
    let key = ctx.client.create_tracking_issue(kind, &fields).await?;
    info!("Created {} {} '{}'", kind, key, summary);
    Ok(key)
}

async fn add_if_absent<C>(
    ctx: Arc<SyncContext<C>>,
    kind: TrackingIssueKind,
    issue_key: String,
    test_key: String,
) -> Result<()>
where
    C: ExecutionClient + ?Sized,
{
    let current = ctx.client.tracking_issues_of_test(kind, &test_key).await?;
    if current.iter().any(|key| key == &issue_key) {
        return Ok(());
    }
    ctx.client.add_tests(kind, &issue_key, &[test_key]).await
}

async fn set_run_status<C>(
    ctx: Arc<SyncContext<C>>,
    execution_key: String,
    result: ResultRecord,
) -> Result<()>
where
    C: ExecutionClient + ?Sized,
{
    for run in ctx.client.test_runs(&result.key).await? {
        if run.execution_key == execution_key {
            ctx.client.set_test_run_status(&run.id, result.result).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::error::SyncError;
    use crate::model::{ResultStatus, TestRecord, TestStatus};
    use crate::remote::memory::{InMemoryRemote, RemoteCall};

    fn context(remote: &Arc<InMemoryRemote>) -> Arc<SyncContext<InMemoryRemote>> {
        Arc::new(SyncContext::new(
            remote.clone(),
            SyncConfig::default(),
            "DEMO",
            "bot",
        ))
    }

    #[tokio::test]
    async fn test_upload_creates_plan_and_execution() {
        let remote = Arc::new(InMemoryRemote::new("DEMO"));
        let a = remote.seed_test(TestRecord::new("a"), TestStatus::Finalized);
        let b = remote.seed_test(TestRecord::new("b"), TestStatus::Finalized);

        let report = upload_results(
            context(&remote),
            "Plan 1",
            "Nightly",
            vec![
                ResultRecord::new(a.clone(), ResultStatus::Pass),
                ResultRecord::new(b.clone(), ResultStatus::Fail),
            ],
        )
        .await
        .unwrap();

        let plan = &report.test_plan_key;
        let execution = &report.test_execution_key;
        assert_eq!(remote.tracking_members(plan).len(), 2);
        assert_eq!(remote.tracking_members(execution).len(), 2);
        assert!(remote.plan_executions(plan).contains(execution));
        assert_eq!(
            remote.run_status(&format!("{}:{}", execution, a)),
            Some(ResultStatus::Pass)
        );
        assert_eq!(
            remote.run_status(&format!("{}:{}", execution, b)),
            Some(ResultStatus::Fail)
        );
        assert_eq!(report.run_statuses.succeeded, 2);
    }

    #[tokio::test]
    async fn test_second_upload_reuses_issues_and_skips_members() {
        let remote = Arc::new(InMemoryRemote::new("DEMO"));
        let a = remote.seed_test(TestRecord::new("a"), TestStatus::Finalized);
        let results = vec![ResultRecord::new(a, ResultStatus::Todo)];

        let first = upload_results(context(&remote), "Plan", "Exec", results.clone())
            .await
            .unwrap();
        let second = upload_results(context(&remote), "Plan", "Exec", results)
            .await
            .unwrap();

        assert_eq!(first.test_plan_key, second.test_plan_key);
        assert_eq!(first.test_execution_key, second.test_execution_key);

        let calls = remote.calls();
        let creates = calls
            .iter()
            .filter(|c| matches!(c, RemoteCall::CreateTrackingIssue { .. }))
            .count();
        let adds = calls
            .iter()
            .filter(|c| matches!(c, RemoteCall::AddTests { .. }))
            .count();
        assert_eq!(creates, 2);
        assert_eq!(adds, 2);
    }

    #[tokio::test]
    async fn test_link_failure_keeps_earlier_failures() {
        let remote = Arc::new(InMemoryRemote::new("DEMO"));
        let a = remote.seed_test(TestRecord::new("a"), TestStatus::Finalized);
        let b = remote.seed_test(TestRecord::new("b"), TestStatus::Finalized);
        remote.fail_on("tracking_issues_of_test", Some(a.as_str()));
        remote.fail_on("add_execution_to_plan", None);

        let err = upload_results(
            context(&remote),
            "Plan",
            "Exec",
            vec![ResultRecord::new(b.clone(), ResultStatus::Pass)],
        )
        .await
        .unwrap_err();

        match err {
            SyncError::Aggregated { failed, details } => {
                // plan and execution membership for `a`, plus the link
                assert_eq!(failed, 3);
                assert!(details.contains(&a));
                assert!(details.contains("add_execution_to_plan"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // run statuses are still uploaded
        let execution = remote
            .calls()
            .into_iter()
            .find_map(|call| match call {
                RemoteCall::CreateTrackingIssue {
                    kind: TrackingIssueKind::TestExecution,
                    key,
                    ..
                } => Some(key),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            remote.run_status(&format!("{}:{}", execution, b)),
            Some(ResultStatus::Pass)
        );
    }

    #[tokio::test]
    async fn test_failed_status_update_is_aggregated() {
        let remote = Arc::new(InMemoryRemote::new("DEMO"));
        let a = remote.seed_test(TestRecord::new("a"), TestStatus::Finalized);
        let b = remote.seed_test(TestRecord::new("b"), TestStatus::Finalized);
        remote.fail_on("test_runs", Some(b.as_str()));

        let err = upload_results(
            context(&remote),
            "Plan",
            "Exec",
            vec![
                ResultRecord::new(a, ResultStatus::Pass),
                ResultRecord::new(b.clone(), ResultStatus::Pass),
            ],
        )
        .await
        .unwrap_err();

        let message = err.to_string();
        assert!(message.starts_with("1 work item(s) failed"));
        assert!(message.contains(&b));
    }
}
