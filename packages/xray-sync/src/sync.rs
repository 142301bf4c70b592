use crate::aggregator::FailureCollector;
use crate::config::SyncConfig;
use crate::context::SyncContext;
use crate::diff;
use crate::dispatcher::{duration_ms, PhaseReport, PhasedDispatcher};
use crate::error::Result;
use crate::folders::{ensure_folders, FolderLayout};
use crate::lifecycle::LifecycleApplier;
use crate::model::{OperationKind, ResultRecord, TestRecord};
use crate::remote::{ExecutionClient, RemoteTestClient};
use crate::results::{upload_results, UploadReport};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Summary of a successful sync run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub remote_count: usize,
    pub local_count: usize,
    pub phases: Vec<PhaseReport>,
    pub duration_ms: u64,
}

impl SyncReport {
    /// Items attempted across every phase
    pub fn total_items(&self) -> usize {
        self.phases.iter().map(|p| p.attempted).sum()
    }
}

/// Entry point: keeps the remote inventory in line with local declarations
pub struct XraySync<C: ?Sized> {
    ctx: Arc<SyncContext<C>>,
}

impl<C> XraySync<C>
where
    C: RemoteTestClient + ?Sized + 'static,
{
    pub fn new(
        client: Arc<C>,
        config: SyncConfig,
        project_key: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            ctx: Arc::new(SyncContext::new(client, config, project_key, user)),
        }
    }

    pub fn context(&self) -> &SyncContext<C> {
        &self.ctx
    }

    /// Reconcile the remote inventory with `local`.
    ///
    /// Every phase runs even when items fail; the failures come back as one
    /// aggregated error after the last phase.
    pub async fn sync_tests(&self, local: Vec<TestRecord>) -> Result<SyncReport> {
        let start = Instant::now();
        self.ctx.begin_run();
        self.ctx.config.validate()?;

        let folders = ensure_folders(&self.ctx).await?;
        let remote = self.ctx.query_inventory().await?;
        let plan = diff::plan(&remote, &local, self.ctx.config.duplicate_key_policy)?;

        info!(
            "Sync plan for {}: {} marked, {} obsolete, {} create, {} update",
            self.ctx.project_key,
            plan.marked.len(),
            plan.obsolete.len(),
            plan.create.len(),
            plan.update.len()
        );

        let (phases, failures) = self.run_phases(folders, plan.into_phases()).await;
        let report = SyncReport {
            remote_count: remote.len(),
            local_count: local.len(),
            phases,
            duration_ms: duration_ms(start.elapsed()),
        };

        if let Err(e) = failures.finish() {
            error!("Sync of {} failed: {}", self.ctx.project_key, e);
            return Err(e);
        }

        info!(
            "Sync of {} completed - {} items in {}ms",
            self.ctx.project_key,
            report.total_items(),
            report.duration_ms
        );
        Ok(report)
    }

    async fn run_phases(
        &self,
        folders: FolderLayout,
        phases: Vec<(OperationKind, Vec<TestRecord>)>,
    ) -> (Vec<PhaseReport>, FailureCollector) {
        let applier = Arc::new(LifecycleApplier::new(self.ctx.clone(), folders));
        let failures = FailureCollector::new();
        let reports = PhasedDispatcher::new(self.ctx.config.concurrency)
            .dispatch(applier, phases, &failures)
            .await;
        (reports, failures)
    }
}

impl<C> XraySync<C>
where
    C: ExecutionClient + ?Sized + 'static,
{
    /// Report execution results into the named test plan and test execution
    pub async fn upload_results(
        &self,
        test_plan_name: &str,
        test_execution_name: &str,
        results: Vec<ResultRecord>,
    ) -> Result<UploadReport> {
        upload_results(
            self.ctx.clone(),
            test_plan_name,
            test_execution_name,
            results,
        )
        .await
    }
}
