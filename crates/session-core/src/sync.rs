//! Manifest → index synchronisation.
//!
//! The sync engine only reads manifests; it never takes a session lock and
//! never writes back. Every index row can be rebuilt from disk at any time.

use crate::config::Config;
use crate::error::{Result, SessionError};
use crate::index::{IndexStore, SyncRecord};
use crate::manifest::SessionManifest;
use crate::paths;
use crate::types::{Phase, Status};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Extensions
// ---------------------------------------------------------------------------

/// Index-only fields that do not come from the manifest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extensions {
    pub project_id: Option<String>,
    pub total_input_tokens: Option<i64>,
    pub total_output_tokens: Option<i64>,
    pub total_cost_usd: Option<f64>,
}

/// Supplies extension fields at sync time. `None` values leave whatever the
/// index already holds.
pub trait ExtensionSource: Send + Sync {
    fn extensions(&self, _manifest: &SessionManifest) -> Extensions {
        Extensions::default()
    }
}

pub struct NoExtensions;

impl ExtensionSource for NoExtensions {}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// Deterministic manifest → row projection. Only `synced_at` varies between
/// two projections of the same manifest.
pub fn project(
    manifest: &SessionManifest,
    session_dir: &Path,
    manifest_file: &Path,
    ext: Extensions,
    synced_at: DateTime<Utc>,
) -> SyncRecord {
    let progress = &manifest.build_progress;
    SyncRecord {
        session_id: manifest.session_id.clone(),
        topic: manifest.topic.clone(),
        description: manifest.description.clone(),
        session_type: manifest.session_type.to_string(),
        phase: manifest.current_phase,
        status: manifest.status,
        phase_history: manifest.phase_history.clone(),
        checkpoints_total: progress.checkpoints_total,
        checkpoints_completed: progress.checkpoints_completed.clone(),
        checkpoints_completed_count: progress.checkpoints_completed.len() as u32,
        current_checkpoint: progress.current_checkpoint,
        git_branch: manifest.git.branch.clone(),
        git_worktree: manifest.git.worktree.clone(),
        git_base_branch: manifest.git.base_branch.clone(),
        commits: manifest.commits.clone(),
        spec_path: manifest.artifacts.spec.clone(),
        plan_path: manifest.artifacts.plan.clone(),
        plan_readable_path: manifest.artifacts.plan_readable.clone(),
        manifest_location: manifest_file.display().to_string(),
        spec_exists: session_dir.join(&manifest.artifacts.spec).exists(),
        plan_exists: session_dir.join(&manifest.artifacts.plan).exists(),
        created_at: manifest.created_at,
        updated_at: manifest.updated_at,
        project_id: ext.project_id,
        total_input_tokens: ext.total_input_tokens,
        total_output_tokens: ext.total_output_tokens,
        total_cost_usd: ext.total_cost_usd,
        synced_at,
    }
}

// ---------------------------------------------------------------------------
// Onboarding results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncedItem {
    pub session_id: String,
    pub location: String,
    pub phase: Phase,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedItem {
    pub location: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnboardSummary {
    pub synced: Vec<SyncedItem>,
    pub failed: Vec<FailedItem>,
}

#[derive(Debug, Clone)]
pub struct OnboardOptions {
    pub max_parallel: usize,
}

impl Default for OnboardOptions {
    fn default() -> Self {
        Self { max_parallel: 8 }
    }
}

impl From<&Config> for OnboardOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            max_parallel: cfg.sync.max_parallel.max(1),
        }
    }
}

const CANCELLED: &str = "cancelled";

// ---------------------------------------------------------------------------
// SyncEngine
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SyncEngine {
    index: Arc<IndexStore>,
    extensions: Arc<dyn ExtensionSource>,
}

impl SyncEngine {
    pub fn new(index: Arc<IndexStore>) -> Self {
        Self {
            index,
            extensions: Arc::new(NoExtensions),
        }
    }

    pub fn with_extensions(mut self, extensions: Arc<dyn ExtensionSource>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn index(&self) -> &IndexStore {
        &self.index
    }

    /// Read one manifest (a session directory or its `state.json`) and upsert
    /// its projection.
    pub fn sync_one(&self, location: &Path) -> Result<SyncRecord> {
        let (session_dir, manifest_file) = paths::resolve_manifest_location(location);
        let manifest = SessionManifest::read(&manifest_file)?;

        if let Some(dir_name) = session_dir.file_name().and_then(|n| n.to_str()) {
            if dir_name != manifest.session_id {
                return Err(SessionError::InvalidManifest {
                    path: manifest_file.display().to_string(),
                    reason: format!(
                        "session_id '{}' does not match directory '{dir_name}'",
                        manifest.session_id
                    ),
                });
            }
        }

        let ext = self.extensions.extensions(&manifest);
        let record = project(&manifest, &session_dir, &manifest_file, ext, Utc::now());
        self.index.upsert(&record)?;
        tracing::info!(
            session_id = %record.session_id,
            phase = %record.phase,
            status = %record.status,
            "session synced"
        );
        Ok(record)
    }

    /// Sync every session directory under `<root>/agents/sessions`.
    ///
    /// Per-item failures are collected, never raised. Items not yet started
    /// when `cancel` fires are reported as failed with `cancelled`.
    pub async fn onboard_all(
        &self,
        root: &Path,
        options: &OnboardOptions,
        cancel: &CancellationToken,
    ) -> Result<OnboardSummary> {
        let dirs = session_dirs(root)?;
        let semaphore = Arc::new(Semaphore::new(options.max_parallel.max(1)));
        let mut handles = Vec::with_capacity(dirs.len());

        for dir in dirs {
            let sem = semaphore.clone();
            let engine = self.clone();
            let cancel = cancel.clone();
            let handle = tokio::spawn(async move {
                let location = dir.display().to_string();
                let permit = tokio::select! {
                    _ = cancel.cancelled() => None,
                    p = sem.acquire_owned() => p.ok(),
                };
                let Some(_permit) = permit else {
                    return (location, Err(CANCELLED.to_string()));
                };
                if cancel.is_cancelled() {
                    return (location, Err(CANCELLED.to_string()));
                }
                let result = tokio::task::spawn_blocking(move || engine.sync_one(&dir))
                    .await
                    .map_err(|e| format!("sync task join error: {e}"))
                    .and_then(|r| r.map_err(|e| e.to_string()));
                (location, result)
            });
            handles.push(handle);
        }

        let mut summary = OnboardSummary::default();
        for handle in handles {
            match handle.await {
                Ok((location, Ok(record))) => summary.synced.push(SyncedItem {
                    session_id: record.session_id,
                    location,
                    phase: record.phase,
                    status: record.status,
                }),
                Ok((location, Err(error))) => {
                    tracing::warn!(%location, %error, "session not synced");
                    summary.failed.push(FailedItem { location, error });
                }
                Err(e) => summary.failed.push(FailedItem {
                    location: "unknown".to_string(),
                    error: format!("task join error: {e}"),
                }),
            }
        }
        summary.synced.sort_by(|a, b| a.location.cmp(&b.location));
        summary.failed.sort_by(|a, b| a.location.cmp(&b.location));

        tracing::info!(
            synced = summary.synced.len(),
            failed = summary.failed.len(),
            "onboarding finished"
        );
        Ok(summary)
    }
}

fn session_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let dir = paths::sessions_dir(root);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

// ---------------------------------------------------------------------------
// Sync triggers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncReason {
    Created,
    PhaseTransition,
    CheckpointCompleted,
    StatusChanged,
    Manual,
}

impl fmt::Display for SyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncReason::Created => "created",
            SyncReason::PhaseTransition => "phase_transition",
            SyncReason::CheckpointCompleted => "checkpoint_completed",
            SyncReason::StatusChanged => "status_changed",
            SyncReason::Manual => "manual",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    pub session_id: String,
    pub manifest_location: PathBuf,
    pub reason: SyncReason,
}

/// Receives sync requests from the state manager after a successful write.
/// Implementations must not block and must not fail the caller.
pub trait SyncTrigger: Send + Sync {
    fn trigger(&self, job: SyncJob);
}

/// Bounded, non-blocking sender half of the sync pipeline.
#[derive(Clone)]
pub struct SyncQueue {
    tx: mpsc::Sender<SyncJob>,
}

impl SyncQueue {
    pub fn channel(capacity: usize) -> (SyncQueue, SyncWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (SyncQueue { tx }, SyncWorker { rx })
    }
}

impl SyncTrigger for SyncQueue {
    fn trigger(&self, job: SyncJob) {
        match self.tx.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!(session_id = %job.session_id, reason = %job.reason, "sync queue full; job dropped");
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                tracing::warn!(session_id = %job.session_id, reason = %job.reason, "sync queue closed; job dropped");
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub synced: usize,
    pub failed: usize,
}

pub struct SyncWorker {
    rx: mpsc::Receiver<SyncJob>,
}

impl SyncWorker {
    /// Drain jobs until every sender is dropped or `cancel` fires.
    pub async fn run(mut self, engine: SyncEngine, cancel: CancellationToken) -> WorkerStats {
        let mut stats = WorkerStats::default();
        loop {
            let job = tokio::select! {
                _ = cancel.cancelled() => break,
                job = self.rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            let engine = engine.clone();
            let location = job.manifest_location.clone();
            let result = tokio::task::spawn_blocking(move || engine.sync_one(&location)).await;
            match result {
                Ok(Ok(_)) => stats.synced += 1,
                Ok(Err(e)) => {
                    stats.failed += 1;
                    tracing::warn!(session_id = %job.session_id, reason = %job.reason, error = %e, "sync job failed");
                }
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(session_id = %job.session_id, error = %e, "sync job panicked");
                }
            }
        }
        stats
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
