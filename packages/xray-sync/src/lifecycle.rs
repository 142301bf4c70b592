//! Lifecycle applier
//!
//! Drives one remote test record through the status transitions and field
//! mutations its operation kind requires. The first failing remote call
//! aborts the remaining steps for that record.
//!
//! | Kind            | Sequence                                                         |
//! |-----------------|------------------------------------------------------------------|
//! | Create          | create, finalize chain, link requirements, move into active      |
//! | Obsolete        | set Obsolete, unlink, leave active, move into obsolete           |
//! | Update          | update summary/description, unlink, re-link                      |
//! | MarkedReconcile | back to draft if needed, re-link, move into active, finalize, overwrite fields |

use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::executor::WorkHandler;
use crate::folders::FolderLayout;
use crate::model::{OperationKind, TestRecord, TestStatus, WorkItem};
use crate::remote::{RemoteTestClient, TestFields};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

pub struct LifecycleApplier<C: ?Sized> {
    ctx: Arc<SyncContext<C>>,
    folders: FolderLayout,
}

impl<C> LifecycleApplier<C>
where
    C: RemoteTestClient + ?Sized,
{
    pub fn new(ctx: Arc<SyncContext<C>>, folders: FolderLayout) -> Self {
        Self { ctx, folders }
    }

    pub async fn apply(&self, item: WorkItem) -> Result<()> {
        match item.kind {
            OperationKind::MarkedReconcile => self.reconcile_marked(&item.record).await,
            OperationKind::Obsolete => self.obsolete(&item.record).await,
            OperationKind::Create => self.create(&item.record).await.map(|_| ()),
            OperationKind::Update => self.update(&item.record).await,
        }
    }

    /// Create the record remotely and return its new key
    pub async fn create(&self, record: &TestRecord) -> Result<String> {
        let client = &self.ctx.client;
        let fields = TestFields {
            summary: Some(record.summary.clone()),
            description: Some(record.description_text().to_string()),
            unique_identifier: record.identifier().map(str::to_string),
            assignee: Some(self.ctx.user.clone()),
            custom_fields: self.ctx.custom_field_payload().await?,
            ..Default::default()
        };

        let key = client.create_record(&fields).await?;
        debug!("Created {} for '{}'", key, record.summary);

        self.finalize(&key).await?;
        self.link_requirements(&key, record).await?;
        client.move_into_folder(&key, self.folders.active).await?;

        info!(key = %key, "Test created: {}", record.summary);
        Ok(key)
    }

    pub async fn obsolete(&self, record: &TestRecord) -> Result<()> {
        let key = remote_key(record, OperationKind::Obsolete)?;
        let client = &self.ctx.client;

        client.set_status(key, TestStatus::Obsolete.as_str()).await?;
        client.unlink_all(key).await?;
        client.remove_from_folder(key, self.folders.active).await?;
        client.move_into_folder(key, self.folders.obsolete).await?;

        info!(key = %key, "Test obsoleted: {}", record.summary);
        Ok(())
    }

    pub async fn update(&self, record: &TestRecord) -> Result<()> {
        let key = remote_key(record, OperationKind::Update)?;
        let client = &self.ctx.client;
        let fields = TestFields {
            summary: Some(record.summary.clone()),
            description: Some(record.description_text().to_string()),
            ..Default::default()
        };

        client.update_fields(key, &fields).await?;
        client.unlink_all(key).await?;
        self.link_requirements(key, record).await?;

        info!(key = %key, "Test updated: {}", record.summary);
        Ok(())
    }

    /// Re-adopt a record referenced by key that the inventory query does not return
    pub async fn reconcile_marked(&self, record: &TestRecord) -> Result<()> {
        let key = remote_key(record, OperationKind::MarkedReconcile)?;
        let client = &self.ctx.client;
        // resolved up front so a bad field name fails before any mutation
        let custom_fields = self.ctx.custom_field_payload().await?;

        let current = client.fetch_one(key).await?;
        if current.status != TestStatus::New.as_str() {
            debug!(
                "Reverting {} from '{}' to {}",
                key,
                current.status,
                TestStatus::New
            );
            client.set_status(key, TestStatus::New.as_str()).await?;
        }

        client.unlink_all(key).await?;
        self.link_requirements(key, record).await?;
        client.move_into_folder(key, self.folders.active).await?;
        self.finalize(key).await?;

        let fields = TestFields {
            summary: Some(record.summary.clone()),
            description: Some(record.description_text().to_string()),
            unique_identifier: record.identifier().map(str::to_string),
            assignee: Some(self.ctx.user.clone()),
            reporter: Some(self.ctx.user.clone()),
            labels: Some(Vec::new()),
            custom_fields,
        };
        client.update_fields(key, &fields).await?;

        info!(key = %key, "Marked test reconciled: {}", record.summary);
        Ok(())
    }

    async fn finalize(&self, key: &str) -> Result<()> {
        for status in TestStatus::FINALIZE_CHAIN {
            self.ctx.client.set_status(key, status.as_str()).await?;
        }
        Ok(())
    }

    async fn link_requirements(&self, key: &str, record: &TestRecord) -> Result<()> {
        for requirement in &record.requirement_keys {
            self.ctx.client.link_to_requirement(key, requirement).await?;
        }
        Ok(())
    }
}

fn remote_key(record: &TestRecord, kind: OperationKind) -> Result<&str> {
    record
        .key
        .as_deref()
        .ok_or_else(|| SyncError::remote(kind.as_str(), "record has no remote key"))
}

#[async_trait]
impl<C> WorkHandler for LifecycleApplier<C>
where
    C: RemoteTestClient + ?Sized + 'static,
{
    async fn handle(&self, item: WorkItem) -> Result<()> {
        self.apply(item).await
    }
}
