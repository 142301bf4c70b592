/*
 * xray-sync - Test Inventory Reconciliation
 *
 * Keeps a remote test-management inventory in line with locally declared
 * test cases and reports execution results back into it.
 *
 * Architecture:
 * - Inventory Differ (pure, indexed by matching key)
 * - Lifecycle Applier (per-record status transitions)
 * - Phased Dispatcher (ordered phases on a bounded executor)
 * - Failure Aggregator (one combined error per run)
 */

// Public modules
pub mod aggregator;
pub mod config;
pub mod context;
pub mod diff;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod folders;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod remote;
pub mod results;
pub mod sync;

// Re-exports
pub use aggregator::{Failure, FailureCollector};
pub use config::{CustomFieldValue, DuplicateKeyPolicy, SyncConfig};
pub use context::{FieldCatalog, SyncContext};
pub use diff::{diff, diff_with_policy, plan, split_marked, InventoryDiff, SyncPlan};
pub use dispatcher::{PhaseReport, PhasedDispatcher};
pub use error::{InventorySide, Result, SyncError};
pub use executor::{BatchOutcome, BoundedExecutor, WorkHandler};
pub use folders::{ensure_folders, FolderLayout};
pub use lifecycle::LifecycleApplier;
pub use logging::init_logging;
pub use model::{OperationKind, ResultRecord, ResultStatus, TestRecord, TestStatus, WorkItem};
pub use remote::memory::{InMemoryRemote, RemoteCall};
pub use remote::{
    CustomField, ExecutionClient, FolderId, InventoryQuery, RemoteTest, RemoteTestClient,
    TestFields, TestRun, TrackingIssueKind,
};
pub use results::{upload_results, UploadReport};
pub use sync::{SyncReport, XraySync};
