//! The session manifest: the durable, authoritative per-session record.
//!
//! Stored as `agents/sessions/<id>/state.json`. Only the state manager writes
//! it; everything else (sync engine, CLI readers) treats it as read-only.

use crate::error::{Result, SessionError};
use crate::migrations;
use crate::notes::DevNote;
use crate::paths;
use crate::types::{Phase, SessionType, Status};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SCHEMA_VERSION: u32 = 2;

// ---------------------------------------------------------------------------
// PhaseHistory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSpan {
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Start/end timestamps for the four non-terminal phases (8 slots).
/// `complete` is terminal and has no span.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseHistory {
    #[serde(default)]
    pub intent: PhaseSpan,
    #[serde(default)]
    pub design: PhaseSpan,
    #[serde(default)]
    pub execute: PhaseSpan,
    #[serde(default)]
    pub document: PhaseSpan,
}

impl PhaseHistory {
    pub fn span(&self, phase: Phase) -> Option<&PhaseSpan> {
        match phase {
            Phase::Intent => Some(&self.intent),
            Phase::Design => Some(&self.design),
            Phase::Execute => Some(&self.execute),
            Phase::Document => Some(&self.document),
            Phase::Complete => None,
        }
    }

    pub fn span_mut(&mut self, phase: Phase) -> Option<&mut PhaseSpan> {
        match phase {
            Phase::Intent => Some(&mut self.intent),
            Phase::Design => Some(&mut self.design),
            Phase::Execute => Some(&mut self.execute),
            Phase::Document => Some(&mut self.document),
            Phase::Complete => None,
        }
    }

    /// True if every slot that was already set in `previous` is unchanged here.
    pub fn preserves(&self, previous: &PhaseHistory) -> bool {
        Phase::all().iter().filter_map(|&p| {
            Some((previous.span(p)?, self.span(p)?))
        }).all(|(before, after)| {
            (before.started_at.is_none() || before.started_at == after.started_at)
                && (before.completed_at.is_none() || before.completed_at == after.completed_at)
        })
    }
}

// ---------------------------------------------------------------------------
// BuildProgress
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildProgress {
    #[serde(default)]
    pub checkpoints_total: Option<u32>,
    #[serde(default)]
    pub checkpoints_completed: Vec<u32>,
    #[serde(default)]
    pub current_checkpoint: Option<u32>,
}

impl BuildProgress {
    pub fn is_initialized(&self) -> bool {
        self.checkpoints_total.is_some()
    }

    pub fn is_completed(&self, checkpoint: u32) -> bool {
        self.checkpoints_completed.contains(&checkpoint)
    }

    /// Lowest checkpoint id in `1..=total` not yet completed.
    pub fn first_uncompleted(&self) -> Option<u32> {
        let total = self.checkpoints_total?;
        (1..=total).find(|id| !self.is_completed(*id))
    }

    /// Lowest uncompleted checkpoint strictly after `after`. When none is
    /// left above it, falls back to [`first_uncompleted`](Self::first_uncompleted):
    /// the lowest open id overall, which is `after` itself if `after` is
    /// still open and nothing below it is.
    pub fn next_uncompleted_after(&self, after: u32) -> Option<u32> {
        let total = self.checkpoints_total?;
        ((after + 1)..=total)
            .find(|id| !self.is_completed(*id))
            .or_else(|| self.first_uncompleted())
    }

    pub fn is_finished(&self) -> bool {
        self.is_initialized() && self.first_uncompleted().is_none()
    }
}

// ---------------------------------------------------------------------------
// GitContext / Commit / Artifacts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitContext {
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub worktree: Option<String>,
    #[serde(default)]
    pub base_branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub message: String,
    #[serde(default, alias = "checkpoint_id")]
    pub checkpoint: Option<u32>,
    pub created_at: DateTime<Utc>,
}

/// Paths (relative to the session directory) read by external renderers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifacts {
    #[serde(default = "default_spec_artifact")]
    pub spec: String,
    #[serde(default = "default_plan_artifact")]
    pub plan: String,
    #[serde(default = "default_plan_readable_artifact")]
    pub plan_readable: String,
}

fn default_spec_artifact() -> String {
    "spec.md".to_string()
}

fn default_plan_artifact() -> String {
    paths::PLAN_FILE.to_string()
}

fn default_plan_readable_artifact() -> String {
    "plan.md".to_string()
}

impl Default for Artifacts {
    fn default() -> Self {
        Self {
            spec: default_spec_artifact(),
            plan: default_plan_artifact(),
            plan_readable: default_plan_readable_artifact(),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionManifest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionManifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub session_id: String,
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub session_type: SessionType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub current_phase: Phase,
    pub status: Status,
    #[serde(default)]
    pub phase_history: PhaseHistory,
    #[serde(default)]
    pub build_progress: BuildProgress,
    #[serde(default)]
    pub git: GitContext,
    #[serde(default)]
    pub commits: Vec<Commit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dev_notes: Vec<DevNote>,
    #[serde(default)]
    pub artifacts: Artifacts,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl SessionManifest {
    pub fn new(
        session_id: impl Into<String>,
        topic: impl Into<String>,
        session_type: SessionType,
        now: DateTime<Utc>,
    ) -> Self {
        let mut phase_history = PhaseHistory::default();
        phase_history.intent.started_at = Some(now);
        Self {
            schema_version: SCHEMA_VERSION,
            session_id: session_id.into(),
            topic: topic.into(),
            description: None,
            session_type,
            created_at: now,
            updated_at: now,
            current_phase: Phase::Intent,
            status: Status::Active,
            phase_history,
            build_progress: BuildProgress::default(),
            git: GitContext::default(),
            commits: Vec::new(),
            dev_notes: Vec::new(),
            artifacts: Artifacts::default(),
        }
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Read and parse a manifest file, migrating older schema versions.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            let session_id = path
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Err(SessionError::SessionNotFound {
                session_id,
                path: path.display().to_string(),
            });
        }
        let data = std::fs::read_to_string(path)?;
        Self::parse(&data, path)
    }

    pub fn parse(data: &str, path: &Path) -> Result<Self> {
        let invalid = |reason: String| SessionError::InvalidManifest {
            path: path.display().to_string(),
            reason,
        };
        let raw: serde_json::Value =
            serde_json::from_str(data).map_err(|e| invalid(e.to_string()))?;
        let migrated = migrations::migrate_manifest(raw).map_err(invalid)?;
        serde_json::from_value(migrated).map_err(|e| invalid(e.to_string()))
    }

    pub fn load(root: &Path, session_id: &str) -> Result<Self> {
        paths::validate_session_id(session_id)?;
        Self::read(&paths::manifest_path(root, session_id))
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        crate::io::write_json(&paths::manifest_path(root, &self.session_id), self)
    }

    /// All manifests under `root`, oldest first. Unreadable entries are skipped.
    pub fn list(root: &Path) -> Result<Vec<Self>> {
        let dir = paths::sessions_dir(root);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut manifests = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let path = entry.path().join(paths::MANIFEST_FILE);
            match Self::read(&path) {
                Ok(m) => manifests.push(m),
                Err(SessionError::SessionNotFound { .. }) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable manifest");
                }
            }
        }
        manifests.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(manifests)
    }

    // -----------------------------------------------------------------------
    // Invariants
    // -----------------------------------------------------------------------

    /// Advance `updated_at` without ever moving it backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Check every structural invariant of the manifest.
    pub fn validate(&self) -> Result<()> {
        paths::validate_session_id(&self.session_id)?;

        if self.updated_at < self.created_at {
            return Err(SessionError::validation(
                "updated_at",
                "must not precede created_at",
            ));
        }

        for &phase in Phase::all() {
            let Some(span) = self.phase_history.span(phase) else {
                continue;
            };
            if span.completed_at.is_some() && phase >= self.current_phase {
                return Err(SessionError::validation(
                    "phase_history",
                    format!("phase '{phase}' is marked completed but has not been left"),
                ));
            }
            if let (Some(start), Some(end)) = (span.started_at, span.completed_at) {
                if end < start {
                    return Err(SessionError::validation(
                        "phase_history",
                        format!("phase '{phase}' completed before it started"),
                    ));
                }
            }
        }

        let progress = &self.build_progress;
        if let Some(total) = progress.checkpoints_total {
            if total < 1 {
                return Err(SessionError::validation(
                    "checkpoints_total",
                    "must be at least 1",
                ));
            }
            let mut prev = 0;
            for &id in &progress.checkpoints_completed {
                if id <= prev || id > total {
                    return Err(SessionError::validation(
                        "checkpoints_completed",
                        format!("must be strictly increasing within 1..={total}"),
                    ));
                }
                prev = id;
            }
            if let Some(current) = progress.current_checkpoint {
                if current < 1 || current > total || progress.is_completed(current) {
                    return Err(SessionError::validation(
                        "current_checkpoint",
                        format!("{current} is not a pending checkpoint in 1..={total}"),
                    ));
                }
            }
        } else if !progress.checkpoints_completed.is_empty()
            || progress.current_checkpoint.is_some()
        {
            return Err(SessionError::validation(
                "build_progress",
                "checkpoint state present without checkpoints_total",
            ));
        }

        for commit in &self.commits {
            if commit.sha.trim().is_empty() || commit.message.trim().is_empty() {
                return Err(SessionError::validation(
                    "commits",
                    "sha and message must be non-empty",
                ));
            }
        }

        Ok(())
    }

    pub fn session_dir(&self, root: &Path) -> std::path::PathBuf {
        paths::session_dir(root, &self.session_id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn new_manifest_starts_in_intent() {
        let now = ts("2026-03-01T10:00:00Z");
        let m = SessionManifest::new("s1", "Auth flow", SessionType::Full, now);
        assert_eq!(m.current_phase, Phase::Intent);
        assert_eq!(m.status, Status::Active);
        assert_eq!(m.phase_history.intent.started_at, Some(now));
        assert!(m.phase_history.intent.completed_at.is_none());
        m.validate().unwrap();
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let m = SessionManifest::new("s1", "Topic", SessionType::Quick, Utc::now());
        m.save(dir.path()).unwrap();

        let loaded = SessionManifest::load(dir.path(), "s1").unwrap();
        assert_eq!(loaded, m);
    }

    #[test]
    fn load_missing_is_session_not_found() {
        let dir = TempDir::new().unwrap();
        let err = SessionManifest::load(dir.path(), "ghost").unwrap_err();
        assert!(matches!(err, SessionError::SessionNotFound { .. }));
    }

    #[test]
    fn malformed_json_is_invalid_manifest() {
        let dir = TempDir::new().unwrap();
        let path = paths::manifest_path(dir.path(), "bad");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();
        let err = SessionManifest::read(&path).unwrap_err();
        assert_eq!(err.kind(), "invalid_manifest");
    }

    #[test]
    fn unknown_phase_rejected() {
        let json = r#"{"session_id":"s1","topic":"t","created_at":"2026-01-01T00:00:00Z",
            "updated_at":"2026-01-01T00:00:00Z","current_phase":"shipping","status":"active",
            "schema_version":2}"#;
        let err = SessionManifest::parse(json, Path::new("state.json")).unwrap_err();
        assert!(matches!(err, SessionError::InvalidManifest { .. }));
    }

    #[test]
    fn touch_never_moves_backwards() {
        let mut m = SessionManifest::new("s1", "t", SessionType::Full, ts("2026-03-01T10:00:00Z"));
        m.touch(ts("2026-03-01T09:00:00Z"));
        assert_eq!(m.updated_at, ts("2026-03-01T10:00:00Z"));
        m.touch(ts("2026-03-01T11:00:00Z"));
        assert_eq!(m.updated_at, ts("2026-03-01T11:00:00Z"));
    }

    #[test]
    fn validate_rejects_unordered_checkpoints() {
        let mut m = SessionManifest::new("s1", "t", SessionType::Full, Utc::now());
        m.build_progress = BuildProgress {
            checkpoints_total: Some(3),
            checkpoints_completed: vec![2, 1],
            current_checkpoint: Some(3),
        };
        assert!(m.validate().is_err());

        m.build_progress.checkpoints_completed = vec![1, 4];
        assert!(m.validate().is_err());

        m.build_progress.checkpoints_completed = vec![1, 2];
        m.validate().unwrap();
    }

    #[test]
    fn validate_rejects_completed_current_phase() {
        let mut m = SessionManifest::new("s1", "t", SessionType::Full, Utc::now());
        m.phase_history.intent.completed_at = Some(Utc::now());
        assert!(m.validate().is_err());
    }

    #[test]
    fn history_preservation() {
        let now = ts("2026-03-01T10:00:00Z");
        let mut before = PhaseHistory::default();
        before.intent.started_at = Some(now);
        before.intent.completed_at = Some(now);

        let mut after = before.clone();
        after.design.started_at = Some(now);
        assert!(after.preserves(&before));

        after.intent.completed_at = Some(ts("2026-03-02T10:00:00Z"));
        assert!(!after.preserves(&before));
    }

    #[test]
    fn next_uncompleted_skips_completed() {
        let p = BuildProgress {
            checkpoints_total: Some(4),
            checkpoints_completed: vec![1, 2, 4],
            current_checkpoint: Some(3),
        };
        assert_eq!(p.first_uncompleted(), Some(3));
        assert_eq!(p.next_uncompleted_after(1), Some(3));
        // Nothing left above 3, and 3 itself is still open.
        assert_eq!(p.next_uncompleted_after(3), Some(3));

        let gap = BuildProgress {
            checkpoints_total: Some(3),
            checkpoints_completed: vec![2, 3],
            current_checkpoint: None,
        };
        assert_eq!(gap.next_uncompleted_after(3), Some(1));
        let done = BuildProgress {
            checkpoints_total: Some(2),
            checkpoints_completed: vec![1, 2],
            current_checkpoint: None,
        };
        assert!(done.is_finished());
        assert_eq!(done.next_uncompleted_after(2), None);
    }
}
