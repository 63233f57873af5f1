//! Secondary index: a SQLite mirror of every session manifest.
//!
//! Never the source of truth. Every manifest-derived column is overwritten on
//! each upsert; extension columns (`project_id`, usage totals) are merged so
//! a sync without extension data keeps what an earlier sync stored.

use crate::error::{Result, SessionError};
use crate::manifest::{Commit, PhaseHistory, PhaseSpan};
use crate::types::{Phase, Status};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY,
    topic TEXT NOT NULL,
    description TEXT,
    session_type TEXT NOT NULL,
    phase TEXT NOT NULL CHECK (phase IN ('intent', 'design', 'execute', 'document', 'complete')),
    status TEXT NOT NULL CHECK (status IN ('active', 'paused', 'complete', 'failed')),
    intent_started_at TEXT,
    intent_completed_at TEXT,
    design_started_at TEXT,
    design_completed_at TEXT,
    execute_started_at TEXT,
    execute_completed_at TEXT,
    document_started_at TEXT,
    document_completed_at TEXT,
    checkpoints_total INTEGER,
    checkpoints_completed JSON NOT NULL DEFAULT '[]',
    checkpoints_completed_count INTEGER NOT NULL DEFAULT 0,
    current_checkpoint INTEGER,
    git_branch TEXT,
    git_worktree TEXT,
    git_base_branch TEXT,
    commits JSON NOT NULL DEFAULT '[]',
    commit_count INTEGER NOT NULL DEFAULT 0,
    spec_path TEXT NOT NULL,
    plan_path TEXT NOT NULL,
    plan_readable_path TEXT NOT NULL,
    manifest_location TEXT NOT NULL,
    spec_exists INTEGER NOT NULL DEFAULT 0,
    plan_exists INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    project_id TEXT,
    total_input_tokens INTEGER,
    total_output_tokens INTEGER,
    total_cost_usd REAL,
    synced_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_phase ON sessions(phase);
CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project_id);
"#;

const COLUMNS: &str = "session_id, topic, description, session_type, phase, status, \
    intent_started_at, intent_completed_at, design_started_at, design_completed_at, \
    execute_started_at, execute_completed_at, document_started_at, document_completed_at, \
    checkpoints_total, checkpoints_completed, checkpoints_completed_count, current_checkpoint, \
    git_branch, git_worktree, git_base_branch, commits, commit_count, \
    spec_path, plan_path, plan_readable_path, manifest_location, spec_exists, plan_exists, \
    created_at, updated_at, project_id, total_input_tokens, total_output_tokens, total_cost_usd, \
    synced_at";

// ---------------------------------------------------------------------------
// SyncRecord
// ---------------------------------------------------------------------------

/// One index row: a deterministic projection of a manifest plus extension
/// fields supplied at sync time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub session_id: String,
    pub topic: String,
    pub description: Option<String>,
    pub session_type: String,
    pub phase: Phase,
    pub status: Status,
    pub phase_history: PhaseHistory,
    pub checkpoints_total: Option<u32>,
    pub checkpoints_completed: Vec<u32>,
    pub checkpoints_completed_count: u32,
    pub current_checkpoint: Option<u32>,
    pub git_branch: Option<String>,
    pub git_worktree: Option<String>,
    pub git_base_branch: Option<String>,
    pub commits: Vec<Commit>,
    pub spec_path: String,
    pub plan_path: String,
    pub plan_readable_path: String,
    pub manifest_location: String,
    pub spec_exists: bool,
    pub plan_exists: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub project_id: Option<String>,
    pub total_input_tokens: Option<i64>,
    pub total_output_tokens: Option<i64>,
    pub total_cost_usd: Option<f64>,
    pub synced_at: DateTime<Utc>,
}

impl SyncRecord {
    /// The record with `synced_at` cleared, for idempotence comparisons.
    pub fn without_sync_time(&self) -> Self {
        Self {
            synced_at: DateTime::<Utc>::default(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub phase: Option<Phase>,
    pub status: Option<Status>,
    pub project_id: Option<String>,
}

// ---------------------------------------------------------------------------
// IndexStore
// ---------------------------------------------------------------------------

pub struct IndexStore {
    conn: Mutex<Connection>,
}

fn index_err(err: impl std::fmt::Display) -> SessionError {
    SessionError::Index(err.to_string())
}

impl IndexStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(index_err)?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(index_err)?;
        Self::bootstrap(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(index_err)?;
        Self::bootstrap(conn)
    }

    fn bootstrap(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(index_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SessionError::Index("index connection lock poisoned".to_string()))
    }

    /// Insert or fully replace the manifest-derived columns for one session.
    pub fn upsert(&self, record: &SyncRecord) -> Result<()> {
        let h = &record.phase_history;
        let completed = serde_json::to_string(&record.checkpoints_completed)?;
        let commits = serde_json::to_string(&record.commits)?;
        let conn = self.conn()?;
        conn.execute(
            "
            INSERT INTO sessions (
                session_id, topic, description, session_type, phase, status,
                intent_started_at, intent_completed_at, design_started_at, design_completed_at,
                execute_started_at, execute_completed_at, document_started_at, document_completed_at,
                checkpoints_total, checkpoints_completed, checkpoints_completed_count, current_checkpoint,
                git_branch, git_worktree, git_base_branch, commits, commit_count,
                spec_path, plan_path, plan_readable_path, manifest_location, spec_exists, plan_exists,
                created_at, updated_at, project_id, total_input_tokens, total_output_tokens,
                total_cost_usd, synced_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18,
                ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31, ?32, ?33, ?34,
                ?35, ?36
            )
            ON CONFLICT(session_id) DO UPDATE SET
                topic = excluded.topic,
                description = excluded.description,
                session_type = excluded.session_type,
                phase = excluded.phase,
                status = excluded.status,
                intent_started_at = excluded.intent_started_at,
                intent_completed_at = excluded.intent_completed_at,
                design_started_at = excluded.design_started_at,
                design_completed_at = excluded.design_completed_at,
                execute_started_at = excluded.execute_started_at,
                execute_completed_at = excluded.execute_completed_at,
                document_started_at = excluded.document_started_at,
                document_completed_at = excluded.document_completed_at,
                checkpoints_total = excluded.checkpoints_total,
                checkpoints_completed = excluded.checkpoints_completed,
                checkpoints_completed_count = excluded.checkpoints_completed_count,
                current_checkpoint = excluded.current_checkpoint,
                git_branch = excluded.git_branch,
                git_worktree = excluded.git_worktree,
                git_base_branch = excluded.git_base_branch,
                commits = excluded.commits,
                commit_count = excluded.commit_count,
                spec_path = excluded.spec_path,
                plan_path = excluded.plan_path,
                plan_readable_path = excluded.plan_readable_path,
                manifest_location = excluded.manifest_location,
                spec_exists = excluded.spec_exists,
                plan_exists = excluded.plan_exists,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                project_id = COALESCE(excluded.project_id, sessions.project_id),
                total_input_tokens = COALESCE(excluded.total_input_tokens, sessions.total_input_tokens),
                total_output_tokens = COALESCE(excluded.total_output_tokens, sessions.total_output_tokens),
                total_cost_usd = COALESCE(excluded.total_cost_usd, sessions.total_cost_usd),
                synced_at = excluded.synced_at
            ",
            params![
                record.session_id,
                record.topic,
                record.description,
                record.session_type,
                record.phase.as_str(),
                record.status.as_str(),
                ts(h.intent.started_at),
                ts(h.intent.completed_at),
                ts(h.design.started_at),
                ts(h.design.completed_at),
                ts(h.execute.started_at),
                ts(h.execute.completed_at),
                ts(h.document.started_at),
                ts(h.document.completed_at),
                record.checkpoints_total,
                completed,
                record.checkpoints_completed_count,
                record.current_checkpoint,
                record.git_branch,
                record.git_worktree,
                record.git_base_branch,
                commits,
                record.commits.len() as i64,
                record.spec_path,
                record.plan_path,
                record.plan_readable_path,
                record.manifest_location,
                record.spec_exists,
                record.plan_exists,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
                record.project_id,
                record.total_input_tokens,
                record.total_output_tokens,
                record.total_cost_usd,
                record.synced_at.to_rfc3339(),
            ],
        )
        .map_err(index_err)?;
        tracing::debug!(session_id = %record.session_id, "index row upserted");
        Ok(())
    }

    pub fn get(&self, session_id: &str) -> Result<Option<SyncRecord>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM sessions WHERE session_id = ?1"),
                params![session_id],
                RawRow::from_row,
            )
            .optional()
            .map_err(index_err)?;
        raw.map(RawRow::into_record).transpose()
    }

    /// Rows matching every set filter field, oldest first.
    pub fn list(&self, filter: &ListFilter) -> Result<Vec<SyncRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM sessions
                 WHERE (?1 IS NULL OR phase = ?1)
                   AND (?2 IS NULL OR status = ?2)
                   AND (?3 IS NULL OR project_id = ?3)
                 ORDER BY created_at, session_id"
            ))
            .map_err(index_err)?;
        let rows = stmt
            .query_map(
                params![
                    filter.phase.map(Phase::as_str),
                    filter.status.map(Status::as_str),
                    filter.project_id,
                ],
                RawRow::from_row,
            )
            .map_err(index_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(index_err)?;
        rows.into_iter().map(RawRow::into_record).collect()
    }

    pub fn phase_counts(&self) -> Result<BTreeMap<String, usize>> {
        self.counts_by("phase")
    }

    pub fn status_counts(&self) -> Result<BTreeMap<String, usize>> {
        self.counts_by("status")
    }

    fn counts_by(&self, column: &'static str) -> Result<BTreeMap<String, usize>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {column}, COUNT(*) FROM sessions GROUP BY {column}"
            ))
            .map_err(index_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(index_err)?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let (key, n) = row.map_err(index_err)?;
            counts.insert(key, n as usize);
        }
        Ok(counts)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
            .map_err(index_err)?;
        Ok(n as usize)
    }

    /// Returns true if a row was deleted.
    pub fn remove(&self, session_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn
            .execute("DELETE FROM sessions WHERE session_id = ?1", params![session_id])
            .map_err(index_err)?;
        Ok(n > 0)
    }

    /// Drop every row. Rebuild with `SyncEngine::onboard_all`.
    pub fn clear(&self) -> Result<usize> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM sessions", []).map_err(index_err)?;
        tracing::info!(rows = n, "index cleared");
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn ts(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|t| t.to_rfc3339())
}

fn parse_ts(field: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SessionError::Index(format!("bad {field} timestamp '{value}': {e}")))
}

fn parse_opt_ts(field: &str, value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_ts(field, &v)).transpose()
}

/// Column values as stored, before timestamp and JSON decoding.
struct RawRow {
    session_id: String,
    topic: String,
    description: Option<String>,
    session_type: String,
    phase: String,
    status: String,
    history: [Option<String>; 8],
    checkpoints_total: Option<u32>,
    checkpoints_completed: String,
    checkpoints_completed_count: u32,
    current_checkpoint: Option<u32>,
    git_branch: Option<String>,
    git_worktree: Option<String>,
    git_base_branch: Option<String>,
    commits: String,
    spec_path: String,
    plan_path: String,
    plan_readable_path: String,
    manifest_location: String,
    spec_exists: bool,
    plan_exists: bool,
    created_at: String,
    updated_at: String,
    project_id: Option<String>,
    total_input_tokens: Option<i64>,
    total_output_tokens: Option<i64>,
    total_cost_usd: Option<f64>,
    synced_at: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            session_id: row.get(0)?,
            topic: row.get(1)?,
            description: row.get(2)?,
            session_type: row.get(3)?,
            phase: row.get(4)?,
            status: row.get(5)?,
            history: [
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
                row.get(9)?,
                row.get(10)?,
                row.get(11)?,
                row.get(12)?,
                row.get(13)?,
            ],
            checkpoints_total: row.get(14)?,
            checkpoints_completed: row.get(15)?,
            checkpoints_completed_count: row.get(16)?,
            current_checkpoint: row.get(17)?,
            git_branch: row.get(18)?,
            git_worktree: row.get(19)?,
            git_base_branch: row.get(20)?,
            commits: row.get(21)?,
            spec_path: row.get(23)?,
            plan_path: row.get(24)?,
            plan_readable_path: row.get(25)?,
            manifest_location: row.get(26)?,
            spec_exists: row.get(27)?,
            plan_exists: row.get(28)?,
            created_at: row.get(29)?,
            updated_at: row.get(30)?,
            project_id: row.get(31)?,
            total_input_tokens: row.get(32)?,
            total_output_tokens: row.get(33)?,
            total_cost_usd: row.get(34)?,
            synced_at: row.get(35)?,
        })
    }

    fn into_record(self) -> Result<SyncRecord> {
        let [is, ic, ds, dc, es, ec, os, oc] = self.history;
        let span = |start: Option<String>, end: Option<String>, name: &str| -> Result<PhaseSpan> {
            Ok(PhaseSpan {
                started_at: parse_opt_ts(name, start)?,
                completed_at: parse_opt_ts(name, end)?,
            })
        };
        let phase_history = PhaseHistory {
            intent: span(is, ic, "intent")?,
            design: span(ds, dc, "design")?,
            execute: span(es, ec, "execute")?,
            document: span(os, oc, "document")?,
        };
        Ok(SyncRecord {
            phase: self.phase.parse()?,
            status: self.status.parse()?,
            phase_history,
            checkpoints_completed: serde_json::from_str(&self.checkpoints_completed)?,
            commits: serde_json::from_str(&self.commits)?,
            created_at: parse_ts("created_at", &self.created_at)?,
            updated_at: parse_ts("updated_at", &self.updated_at)?,
            synced_at: parse_ts("synced_at", &self.synced_at)?,
            session_id: self.session_id,
            topic: self.topic,
            description: self.description,
            session_type: self.session_type,
            checkpoints_total: self.checkpoints_total,
            checkpoints_completed_count: self.checkpoints_completed_count,
            current_checkpoint: self.current_checkpoint,
            git_branch: self.git_branch,
            git_worktree: self.git_worktree,
            git_base_branch: self.git_base_branch,
            spec_path: self.spec_path,
            plan_path: self.plan_path,
            plan_readable_path: self.plan_readable_path,
            manifest_location: self.manifest_location,
            spec_exists: self.spec_exists,
            plan_exists: self.plan_exists,
            project_id: self.project_id,
            total_input_tokens: self.total_input_tokens,
            total_output_tokens: self.total_output_tokens,
            total_cost_usd: self.total_cost_usd,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
