//! Result upload after a sync run

mod common;

use common::{created_key, engine};
use std::sync::Arc;
use xray_sync::{InMemoryRemote, ResultRecord, ResultStatus, SyncConfig, TestRecord};

#[tokio::test]
async fn test_sync_then_upload_results() {
    let remote = Arc::new(InMemoryRemote::new("DEMO"));
    let sync = engine(&remote, SyncConfig::default().with_concurrency(2));

    sync.sync_tests(vec![
        TestRecord::new("test_login").with_unique_identifier("tests/test_auth.py::test_login"),
        TestRecord::new("test_logout").with_unique_identifier("tests/test_auth.py::test_logout"),
    ])
    .await
    .expect("sync failed");

    let calls = remote.calls();
    let login = created_key(&calls, "test_login").unwrap();
    let logout = created_key(&calls, "test_logout").unwrap();

    let report = sync
        .upload_results(
            "Release 1.0",
            "Nightly 2024-05-01",
            vec![
                ResultRecord::new(login.clone(), ResultStatus::Pass),
                ResultRecord::new(logout.clone(), ResultStatus::Fail),
            ],
        )
        .await
        .expect("upload failed");

    assert_eq!(report.plan_membership.succeeded, 2);
    assert_eq!(report.execution_membership.succeeded, 2);
    assert!(remote
        .plan_executions(&report.test_plan_key)
        .contains(&report.test_execution_key));

    let run = |key: &str| format!("{}:{}", report.test_execution_key, key);
    assert_eq!(remote.run_status(&run(&login)), Some(ResultStatus::Pass));
    assert_eq!(remote.run_status(&run(&logout)), Some(ResultStatus::Fail));
}

#[tokio::test]
async fn test_results_only_touch_runs_of_the_named_execution() {
    let remote = Arc::new(InMemoryRemote::new("DEMO"));
    let sync = engine(&remote, SyncConfig::default());
    sync.sync_tests(vec![TestRecord::new("t")]).await.unwrap();
    let key = created_key(&remote.calls(), "t").unwrap();

    let first = sync
        .upload_results("Plan", "Exec A", vec![ResultRecord::new(key.clone(), ResultStatus::Fail)])
        .await
        .unwrap();
    let second = sync
        .upload_results("Plan", "Exec B", vec![ResultRecord::new(key.clone(), ResultStatus::Pass)])
        .await
        .unwrap();

    assert_eq!(first.test_plan_key, second.test_plan_key);
    assert_ne!(first.test_execution_key, second.test_execution_key);
    assert_eq!(
        remote.run_status(&format!("{}:{}", first.test_execution_key, key)),
        Some(ResultStatus::Fail)
    );
    assert_eq!(
        remote.run_status(&format!("{}:{}", second.test_execution_key, key)),
        Some(ResultStatus::Pass)
    );
    assert_eq!(remote.plan_executions(&first.test_plan_key).len(), 2);
}
