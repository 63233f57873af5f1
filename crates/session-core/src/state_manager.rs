//! The only writer of session manifests.
//!
//! Every mutating call runs the same cycle under the per-session lock:
//! load → mutate a copy → check invariants → atomic write. A failure at any
//! step leaves the files on disk untouched. Successful key transitions are
//! handed to an optional [`SyncTrigger`] without waiting on it.

use crate::config::Config;
use crate::error::{Result, SessionError};
use crate::gate::{self, GateOutcome, VerificationOverride, VerificationResult};
use crate::lock::SessionLock;
use crate::manifest::{BuildProgress, Commit, GitContext, PhaseHistory, SessionManifest};
use crate::notes::DevNote;
use crate::paths;
use crate::plan::{CheckpointReadiness, ExecutionPlan, Task};
use crate::sync::{SyncJob, SyncReason, SyncTrigger};
use crate::types::{NoteCategory, Phase, SessionType, Status, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Operation results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseChange {
    pub session_id: String,
    pub previous: Phase,
    pub phase: Phase,
    pub phase_history: PhaseHistory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointCompletion {
    pub checkpoint: u32,
    pub checkpoints_completed: Vec<u32>,
    pub next_checkpoint: Option<u32>,
    pub gate: GateOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_note: Option<DevNote>,
}

/// Read-only snapshot of a session with its current checkpoint's readiness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub manifest: SessionManifest,
    pub plan_exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness: Option<CheckpointReadiness>,
    #[serde(default)]
    pub eligible_tasks: Vec<String>,
}

// ---------------------------------------------------------------------------
// PlanSlot
// ---------------------------------------------------------------------------

/// Lazily loaded `plan.json` for one mutation. Saved only if marked dirty.
struct PlanSlot {
    root: PathBuf,
    session_id: String,
    plan: Option<ExecutionPlan>,
    original: Option<Vec<u8>>,
    loaded: bool,
    dirty: bool,
}

impl PlanSlot {
    fn new(root: &Path, session_id: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            session_id: session_id.to_string(),
            plan: None,
            original: None,
            loaded: false,
            dirty: false,
        }
    }

    fn get(&mut self) -> Result<Option<&mut ExecutionPlan>> {
        if !self.loaded {
            let path = paths::plan_path(&self.root, &self.session_id);
            if path.exists() {
                let data = std::fs::read(&path)?;
                self.plan = Some(ExecutionPlan::parse(&data, &path)?);
                self.original = Some(data);
            }
            self.loaded = true;
        }
        Ok(self.plan.as_mut())
    }

    fn require(&mut self) -> Result<&mut ExecutionPlan> {
        let session_id = self.session_id.clone();
        self.get()?
            .ok_or(SessionError::PlanNotFound(session_id))
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn dirty_plan(&self) -> Option<&ExecutionPlan> {
        if self.dirty {
            self.plan.as_ref()
        } else {
            None
        }
    }
}

/// Plan first, manifest last: the manifest write is the commit point. If it
/// fails, the plan is put back to the bytes it was loaded from.
fn commit_writes(
    root: &Path,
    session_id: &str,
    plan: &PlanSlot,
    write_manifest: impl FnOnce() -> Result<()>,
) -> Result<()> {
    let dirty = plan.dirty_plan();
    if let Some(p) = dirty {
        p.save(root)?;
        tracing::debug!(session_id, "plan written");
    }
    if let Err(e) = write_manifest() {
        if let (Some(_), Some(bytes)) = (dirty, &plan.original) {
            let path = paths::plan_path(root, session_id);
            if let Err(restore_err) = crate::io::atomic_write(&path, bytes) {
                tracing::warn!(session_id, error = %restore_err, "failed to restore plan");
            }
        }
        return Err(e);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// StateManager
// ---------------------------------------------------------------------------

pub struct StateManager {
    root: PathBuf,
    config: Config,
    trigger: Option<Arc<dyn SyncTrigger>>,
}

impl StateManager {
    /// Open the manager for `root`, reading `agents/config.yaml` if present.
    pub fn open(root: &Path) -> Result<Self> {
        Ok(Self::with_config(root, Config::load(root)?))
    }

    pub fn with_config(root: &Path, config: Config) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
            trigger: None,
        }
    }

    pub fn with_trigger(mut self, trigger: Arc<dyn SyncTrigger>) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn load(&self, session_id: &str) -> Result<SessionManifest> {
        SessionManifest::load(&self.root, session_id)
    }

    pub fn list(&self) -> Result<Vec<SessionManifest>> {
        SessionManifest::list(&self.root)
    }

    pub fn view(&self, session_id: &str) -> Result<SessionView> {
        let manifest = self.load(session_id)?;
        let plan = ExecutionPlan::load_optional(&self.root, session_id)?;
        let (readiness, eligible_tasks) =
            match (&plan, manifest.build_progress.current_checkpoint) {
                (Some(plan), Some(cp)) if plan.checkpoint(cp).is_ok() => (
                    Some(plan.checkpoint_readiness(cp)?),
                    plan.eligible_tasks(cp)?
                        .into_iter()
                        .map(|t| t.id.clone())
                        .collect(),
                ),
                _ => (None, Vec::new()),
            };
        Ok(SessionView {
            plan_exists: plan.is_some(),
            manifest,
            readiness,
            eligible_tasks,
        })
    }

    // -----------------------------------------------------------------------
    // Mutation cycle
    // -----------------------------------------------------------------------

    fn mutate<T>(
        &self,
        session_id: &str,
        reason: Option<SyncReason>,
        op: impl FnOnce(&mut SessionManifest, &mut PlanSlot, DateTime<Utc>) -> Result<T>,
    ) -> Result<T> {
        paths::validate_session_id(session_id)?;
        let manifest_path = paths::manifest_path(&self.root, session_id);
        if !paths::session_dir(&self.root, session_id).is_dir() {
            return Err(SessionError::SessionNotFound {
                session_id: session_id.to_string(),
                path: manifest_path.display().to_string(),
            });
        }

        let lock = SessionLock::acquire(&paths::lock_path(&self.root, session_id))?;
        let before = SessionManifest::read(&manifest_path)?;
        let mut next = before.clone();
        let mut plan = PlanSlot::new(&self.root, session_id);
        let now = Utc::now();

        let out = op(&mut next, &mut plan, now)?;

        let changed = next != before;
        if changed {
            next.touch(now);
            next.validate()?;
            if !next.phase_history.preserves(&before.phase_history) {
                return Err(SessionError::validation(
                    "phase_history",
                    "recorded phase timestamps cannot be rewritten",
                ));
            }
        }
        if let Some(p) = plan.dirty_plan() {
            p.validate()?;
        }

        commit_writes(&self.root, session_id, &plan, || {
            if changed {
                next.save(&self.root)?;
                tracing::debug!(session_id, "manifest written");
            }
            Ok(())
        })?;
        drop(lock);

        if changed {
            if let Some(reason) = reason {
                self.enqueue_sync(session_id, reason);
            }
        }
        Ok(out)
    }

    fn enqueue_sync(&self, session_id: &str, reason: SyncReason) {
        if !self.config.sync.trigger_on_key_transitions {
            return;
        }
        if let Some(trigger) = &self.trigger {
            trigger.trigger(SyncJob {
                session_id: session_id.to_string(),
                manifest_location: paths::session_dir(&self.root, session_id),
                reason,
            });
        }
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    pub fn create_session(
        &self,
        session_id: &str,
        topic: &str,
        description: Option<&str>,
        session_type: SessionType,
    ) -> Result<SessionManifest> {
        paths::validate_session_id(session_id)?;
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(SessionError::validation("topic", "must not be empty"));
        }
        let manifest_path = paths::manifest_path(&self.root, session_id);
        if manifest_path.exists() {
            return Err(SessionError::SessionExists(session_id.to_string()));
        }

        let lock = SessionLock::acquire(&paths::lock_path(&self.root, session_id))?;
        if manifest_path.exists() {
            return Err(SessionError::SessionExists(session_id.to_string()));
        }
        let mut manifest = SessionManifest::new(session_id, topic, session_type, Utc::now());
        manifest.description = description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        manifest.validate()?;
        manifest.save(&self.root)?;
        drop(lock);

        tracing::info!(session_id, %session_type, "session created");
        self.enqueue_sync(session_id, SyncReason::Created);
        Ok(manifest)
    }

    pub fn transition_phase(&self, session_id: &str, new_phase: Phase) -> Result<PhaseChange> {
        self.mutate(session_id, Some(SyncReason::PhaseTransition), |m, _, now| {
            let current = m.current_phase;
            if !current.can_transition_to(new_phase) {
                return Err(SessionError::InvalidTransition {
                    from: current.to_string(),
                    to: new_phase.to_string(),
                    allowed: current.successors().iter().map(|p| p.to_string()).collect(),
                });
            }
            if let Some(span) = m.phase_history.span_mut(current) {
                span.completed_at.get_or_insert(now);
            }
            if let Some(span) = m.phase_history.span_mut(new_phase) {
                span.started_at.get_or_insert(now);
            }
            m.current_phase = new_phase;
            tracing::info!(session_id, from = %current, to = %new_phase, "phase transition");
            Ok(PhaseChange {
                session_id: session_id.to_string(),
                previous: current,
                phase: new_phase,
                phase_history: m.phase_history.clone(),
            })
        })
    }

    pub fn set_status(&self, session_id: &str, status: Status) -> Result<Status> {
        self.mutate(session_id, Some(SyncReason::StatusChanged), |m, _, _| {
            if m.status.is_terminal() {
                return Err(SessionError::TerminalStatus {
                    current: m.status.to_string(),
                    requested: status.to_string(),
                });
            }
            if m.status != status {
                tracing::info!(session_id, from = %m.status, to = %status, "status change");
                m.status = status;
            }
            Ok(status)
        })
    }

    /// Partial update: only the provided fields change.
    pub fn set_git_context(
        &self,
        session_id: &str,
        branch: Option<&str>,
        worktree: Option<&str>,
        base_branch: Option<&str>,
    ) -> Result<GitContext> {
        self.mutate(session_id, None, |m, _, _| {
            for (field, value, slot) in [
                ("branch", branch, &mut m.git.branch),
                ("worktree", worktree, &mut m.git.worktree),
                ("base_branch", base_branch, &mut m.git.base_branch),
            ] {
                if let Some(v) = value {
                    let v = v.trim();
                    if v.is_empty() {
                        return Err(SessionError::validation(field, "must not be empty"));
                    }
                    *slot = Some(v.to_string());
                }
            }
            Ok(m.git.clone())
        })
    }

    pub fn add_commit(
        &self,
        session_id: &str,
        sha: &str,
        message: &str,
        checkpoint: Option<u32>,
    ) -> Result<Vec<Commit>> {
        self.mutate(session_id, None, |m, _, now| {
            let sha = sha.trim();
            let message = message.trim();
            if sha.is_empty() {
                return Err(SessionError::validation("sha", "must not be empty"));
            }
            if message.is_empty() {
                return Err(SessionError::validation("message", "must not be empty"));
            }
            if let Some(cp) = checkpoint {
                check_checkpoint_reference(&m.build_progress, cp)?;
            }
            m.commits.push(Commit {
                sha: sha.to_string(),
                message: message.to_string(),
                checkpoint,
                created_at: now,
            });
            Ok(m.commits.clone())
        })
    }

    pub fn add_dev_note(
        &self,
        session_id: &str,
        category: NoteCategory,
        content: &str,
        checkpoint: Option<u32>,
    ) -> Result<DevNote> {
        self.mutate(session_id, None, |m, _, now| {
            if let Some(cp) = checkpoint {
                check_checkpoint_reference(&m.build_progress, cp)?;
            }
            let note = DevNote::new(category, content, checkpoint, now)?;
            m.dev_notes.push(note.clone());
            Ok(note)
        })
    }

    // -----------------------------------------------------------------------
    // Checkpoint progress
    // -----------------------------------------------------------------------

    /// Set up checkpoint tracking. Repeating with the same total is a no-op.
    pub fn init_execution_progress(&self, session_id: &str, total: u32) -> Result<BuildProgress> {
        self.mutate(session_id, None, |m, plan, _| {
            if total < 1 {
                return Err(SessionError::validation(
                    "checkpoints_total",
                    "must be at least 1",
                ));
            }
            if let Some(existing) = m.build_progress.checkpoints_total {
                if existing == total {
                    return Ok(m.build_progress.clone());
                }
                return Err(SessionError::ProgressAlreadyInitialized {
                    existing,
                    requested: total,
                });
            }
            if let Some(plan) = plan.get()? {
                let declared = plan.checkpoints.len() as u32;
                if declared > 0 && declared != total {
                    return Err(SessionError::validation(
                        "checkpoints_total",
                        format!("plan declares {declared} checkpoints, requested {total}"),
                    ));
                }
            }
            m.build_progress = BuildProgress {
                checkpoints_total: Some(total),
                checkpoints_completed: Vec::new(),
                current_checkpoint: Some(1),
            };
            tracing::info!(session_id, total, "execution progress initialized");
            Ok(m.build_progress.clone())
        })
    }

    pub fn start_checkpoint(&self, session_id: &str, checkpoint: u32) -> Result<BuildProgress> {
        self.mutate(session_id, None, |m, plan, now| {
            let progress = &m.build_progress;
            let total = progress
                .checkpoints_total
                .ok_or(SessionError::ProgressNotInitialized)?;
            let expected = progress.current_checkpoint.or(progress.first_uncompleted());
            let invalid = |reason: String| SessionError::InvalidCheckpoint {
                checkpoint,
                expected,
                reason,
            };

            if checkpoint < 1 || checkpoint > total {
                return Err(invalid(format!("out of range 1..={total}")));
            }
            if progress.is_completed(checkpoint) {
                return Err(invalid("already completed".to_string()));
            }
            if Some(checkpoint) != progress.current_checkpoint
                && Some(checkpoint) != progress.first_uncompleted()
            {
                return Err(invalid("out of sequence".to_string()));
            }

            let mut started_in_plan = false;
            if let Some(p) = plan.get()?.filter(|p| p.checkpoint(checkpoint).is_ok()) {
                let completed = &m.build_progress.checkpoints_completed;
                if let Some(pre) = p
                    .checkpoint(checkpoint)?
                    .prerequisites
                    .iter()
                    .find(|pre| !completed.contains(pre))
                {
                    return Err(invalid(format!("prerequisite checkpoint {pre} is not complete")));
                }
                p.mark_checkpoint_started(checkpoint, now)?;
                started_in_plan = true;
            }
            if started_in_plan {
                plan.mark_dirty();
            }

            m.build_progress.current_checkpoint = Some(checkpoint);
            tracing::info!(session_id, checkpoint, "checkpoint started");
            Ok(m.build_progress.clone())
        })
    }

    /// Complete the current checkpoint after the verification gate passes,
    /// or with an explicit override that is recorded as a dev note.
    pub fn complete_checkpoint(
        &self,
        session_id: &str,
        checkpoint: u32,
        results: &[VerificationResult],
        override_: Option<&VerificationOverride>,
    ) -> Result<CheckpointCompletion> {
        let policy = self.config.verification.clone();
        self.mutate(
            session_id,
            Some(SyncReason::CheckpointCompleted),
            |m, plan, now| {
                let progress = &m.build_progress;
                if !progress.is_initialized() {
                    return Err(SessionError::ProgressNotInitialized);
                }
                if progress.is_completed(checkpoint) {
                    return Err(SessionError::InvalidCheckpoint {
                        checkpoint,
                        expected: progress.current_checkpoint,
                        reason: "already completed".to_string(),
                    });
                }
                if progress.current_checkpoint != Some(checkpoint) {
                    return Err(SessionError::InvalidCheckpoint {
                        checkpoint,
                        expected: progress.current_checkpoint,
                        reason: "not the current checkpoint".to_string(),
                    });
                }
                let override_ = override_
                    .map(|o| VerificationOverride::new(o.justification.clone()))
                    .transpose()?;

                let outcome = gate::evaluate(
                    checkpoint,
                    plan.get()?.as_deref(),
                    results,
                    &policy,
                    session_id,
                )?;

                let override_note = match (outcome.passed, override_) {
                    (true, _) => None,
                    (false, None) => return Err(outcome.to_error()),
                    (false, Some(o)) => {
                        let note = DevNote::verification_override(
                            checkpoint,
                            &o.justification,
                            &outcome.failed_steps,
                            &outcome.incomplete_tasks,
                            now,
                        )?;
                        tracing::warn!(
                            session_id,
                            checkpoint,
                            justification = %o.justification,
                            "verification gate overridden"
                        );
                        m.dev_notes.push(note.clone());
                        Some(note)
                    }
                };

                let progress = &mut m.build_progress;
                progress.checkpoints_completed.push(checkpoint);
                progress.checkpoints_completed.sort_unstable();
                progress.current_checkpoint = progress.next_uncompleted_after(checkpoint);

                let mut completed_in_plan = false;
                if let Some(p) = plan.get()?.filter(|p| p.checkpoint(checkpoint).is_ok()) {
                    p.mark_checkpoint_complete(checkpoint, now)?;
                    completed_in_plan = true;
                }
                if completed_in_plan {
                    plan.mark_dirty();
                }

                tracing::info!(session_id, checkpoint, "checkpoint completed");
                Ok(CheckpointCompletion {
                    checkpoint,
                    checkpoints_completed: progress.checkpoints_completed.clone(),
                    next_checkpoint: progress.current_checkpoint,
                    gate: outcome,
                    override_note,
                })
            },
        )
    }

    // -----------------------------------------------------------------------
    // Plan tasks
    // -----------------------------------------------------------------------

    pub fn update_task(
        &self,
        session_id: &str,
        task_id: &str,
        status: TaskStatus,
        blocker: Option<&str>,
    ) -> Result<Task> {
        self.mutate(session_id, None, |m, plan, now| {
            let task = plan.require()?.set_task_status(task_id, status, blocker, now)?;
            plan.mark_dirty();
            m.touch(now);
            tracing::info!(session_id, task_id, %status, "task status updated");
            Ok(task)
        })
    }

    /// Pending tasks of the current checkpoint whose dependencies are met.
    pub fn eligible_tasks(&self, session_id: &str) -> Result<Vec<Task>> {
        let manifest = self.load(session_id)?;
        let plan = ExecutionPlan::load(&self.root, session_id)?;
        let Some(cp) = manifest.build_progress.current_checkpoint else {
            return Ok(Vec::new());
        };
        Ok(plan.eligible_tasks(cp)?.into_iter().cloned().collect())
    }
}

/// A checkpoint referenced by a commit or note must exist once progress is set up.
fn check_checkpoint_reference(progress: &BuildProgress, checkpoint: u32) -> Result<()> {
    if checkpoint < 1 {
        return Err(SessionError::validation("checkpoint", "must be at least 1"));
    }
    if let Some(total) = progress.checkpoints_total {
        if checkpoint > total {
            return Err(SessionError::validation(
                "checkpoint",
                format!("{checkpoint} is out of range 1..={total}"),
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
