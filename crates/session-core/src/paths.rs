use crate::error::{Result, SessionError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const SESSIONS_DIR: &str = "agents/sessions";

pub const CONFIG_FILE: &str = "agents/config.yaml";
pub const DEFAULT_INDEX_DB: &str = "agents/index.db";

pub const MANIFEST_FILE: &str = "state.json";
pub const PLAN_FILE: &str = "plan.json";
pub const LOCK_FILE: &str = ".lock";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn sessions_dir(root: &Path) -> PathBuf {
    root.join(SESSIONS_DIR)
}

pub fn session_dir(root: &Path, session_id: &str) -> PathBuf {
    sessions_dir(root).join(session_id)
}

pub fn manifest_path(root: &Path, session_id: &str) -> PathBuf {
    session_dir(root, session_id).join(MANIFEST_FILE)
}

pub fn plan_path(root: &Path, session_id: &str) -> PathBuf {
    session_dir(root, session_id).join(PLAN_FILE)
}

pub fn lock_path(root: &Path, session_id: &str) -> PathBuf {
    session_dir(root, session_id).join(LOCK_FILE)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Normalise a manifest location: either a session directory or the
/// `state.json` inside it. Returns `(session_dir, manifest_file)`.
pub fn resolve_manifest_location(location: &Path) -> (PathBuf, PathBuf) {
    if location.file_name().map(|n| n == MANIFEST_FILE).unwrap_or(false) {
        let dir = location
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        (dir, location.to_path_buf())
    } else {
        (location.to_path_buf(), location.join(MANIFEST_FILE))
    }
}

// ---------------------------------------------------------------------------
// Session id validation
// ---------------------------------------------------------------------------

static SESSION_ID_RE: OnceLock<Regex> = OnceLock::new();

fn session_id_re() -> &'static Regex {
    SESSION_ID_RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9_\-]*[a-z0-9]$|^[a-z0-9]$").expect("session id regex")
    })
}

/// Session ids double as directory names, e.g. `2026-02-14_auth-flow`.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.is_empty() || session_id.len() > 96 || !session_id_re().is_match(session_id) {
        return Err(SessionError::InvalidSessionId(session_id.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
