use crate::context::SyncContext;
use crate::error::Result;
use crate::remote::{FolderId, RemoteTestClient};
use tracing::info;

/// Resolved repository folders for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FolderLayout {
    pub active: FolderId,
    /// Nested under `active`
    pub obsolete: FolderId,
}

/// Get-or-create the active folder under the repository root and the
/// obsolete folder beneath it.
pub async fn ensure_folders<C>(ctx: &SyncContext<C>) -> Result<FolderLayout>
where
    C: RemoteTestClient + ?Sized,
{
    let active = ctx
        .client
        .ensure_folder(&ctx.config.active_folder, None)
        .await?;
    let obsolete = ctx
        .client
        .ensure_folder(&ctx.config.obsolete_folder, Some(active))
        .await?;

    info!(
        "Folders ready: '{}' ({}), '{}' ({})",
        ctx.config.active_folder, active, ctx.config.obsolete_folder, obsolete
    );
    Ok(FolderLayout { active, obsolete })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::remote::memory::InMemoryRemote;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_folders_are_created_once() {
        let remote = Arc::new(InMemoryRemote::new("DEMO"));
        let ctx = SyncContext::new(remote.clone(), SyncConfig::default(), "DEMO", "bot");

        let first = ensure_folders(&ctx).await.unwrap();
        let second = ensure_folders(&ctx).await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first.active, first.obsolete);
        assert_eq!(remote.folder_by_name("Automation Test"), Some(first.active));
        assert_eq!(remote.folder_by_name("Obsolete"), Some(first.obsolete));
    }

    #[tokio::test]
    async fn test_folder_failure_propagates() {
        let remote = Arc::new(InMemoryRemote::new("DEMO"));
        remote.fail_on("ensure_folder", None);
        let ctx = SyncContext::new(remote, SyncConfig::default(), "DEMO", "bot");

        assert!(ensure_folders(&ctx).await.is_err());
    }
}
