pub mod commit;
pub mod git;
pub mod index;
pub mod init;
pub mod mcp;
pub mod note;
pub mod phase;
pub mod progress;
pub mod session;
pub mod status;
pub mod sync;
pub mod task;

use anyhow::Context;
use session_core::config::Config;
use session_core::index::IndexStore;
use session_core::sync::{SyncEngine, SyncJob, SyncTrigger};
use session_core::StateManager;
use std::path::Path;
use std::sync::Arc;

/// Open the state manager for `root`. When the index database already exists,
/// key transitions are synced into it before the command returns.
pub fn manager(root: &Path) -> anyhow::Result<StateManager> {
    let mgr = StateManager::open(root).context("failed to load agents/config.yaml")?;
    let index_path = mgr.config().index_path(root);
    if !index_path.exists() {
        return Ok(mgr);
    }
    let engine = open_engine(root, mgr.config())?;
    Ok(mgr.with_trigger(Arc::new(InlineSync { engine })))
}

/// Open (creating if needed) the index configured for `root`.
pub fn open_engine(root: &Path, config: &Config) -> anyhow::Result<SyncEngine> {
    let path = config.index_path(root);
    if let Some(parent) = path.parent() {
        session_core::io::ensure_dir(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let store = IndexStore::open(&path)
        .with_context(|| format!("failed to open index at {}", path.display()))?;
    Ok(SyncEngine::new(Arc::new(store)))
}

/// Runs the sync in the calling process. A failed sync is logged and never
/// fails the command that triggered it.
struct InlineSync {
    engine: SyncEngine,
}

impl SyncTrigger for InlineSync {
    fn trigger(&self, job: SyncJob) {
        if let Err(e) = self.engine.sync_one(&job.manifest_location) {
            tracing::warn!(
                session_id = %job.session_id,
                reason = %job.reason,
                error = %e,
                "inline sync failed"
            );
        }
    }
}
