use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {session_id} (expected {path})")]
    SessionNotFound { session_id: String, path: String },

    #[error("session already exists: {0}")]
    SessionExists(String),

    #[error("invalid session id '{0}': must be lowercase alphanumeric with hyphens or underscores")]
    InvalidSessionId(String),

    #[error("invalid manifest at {path}: {reason}")]
    InvalidManifest { path: String, reason: String },

    #[error("invalid transition from {from} to {to} (allowed: {})", display_allowed(.allowed))]
    InvalidTransition {
        from: String,
        to: String,
        allowed: Vec<String>,
    },

    #[error("invalid checkpoint {checkpoint}: {reason}")]
    InvalidCheckpoint {
        checkpoint: u32,
        expected: Option<u32>,
        reason: String,
    },

    #[error(
        "verification failed for checkpoint {checkpoint}: {} failing step(s), {} incomplete task(s)",
        .failed_steps.len(),
        .incomplete_tasks.len()
    )]
    VerificationFailed {
        checkpoint: u32,
        failed_steps: Vec<String>,
        incomplete_tasks: Vec<String>,
    },

    #[error("execution progress already initialized with {existing} checkpoints (requested {requested})")]
    ProgressAlreadyInitialized { existing: u32, requested: u32 },

    #[error("execution progress not initialized: call init_execution_progress first")]
    ProgressNotInitialized,

    #[error("status '{current}' is terminal; cannot set '{requested}'")]
    TerminalStatus { current: String, requested: String },

    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("invalid phase: {0}")]
    InvalidPhase(String),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("plan not found for session {0}")]
    PlanNotFound(String),

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("task {task} is waiting on: {}", .waiting_on.join(", "))]
    TaskBlocked { task: String, waiting_on: Vec<String> },

    #[error("index error: {0}")]
    Index(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn display_allowed(allowed: &[String]) -> String {
    if allowed.is_empty() {
        "none".to_string()
    } else {
        allowed.join(", ")
    }
}

impl SessionError {
    pub(crate) fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        SessionError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stable snake_case code used by tool callers to branch on failures.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::SessionNotFound { .. } => "session_not_found",
            SessionError::SessionExists(_) => "session_exists",
            SessionError::InvalidSessionId(_) => "invalid_session_id",
            SessionError::InvalidManifest { .. } => "invalid_manifest",
            SessionError::InvalidTransition { .. } => "invalid_transition",
            SessionError::InvalidCheckpoint { .. } => "invalid_checkpoint",
            SessionError::VerificationFailed { .. } => "verification_failed",
            SessionError::ProgressAlreadyInitialized { .. } => "progress_already_initialized",
            SessionError::ProgressNotInitialized => "progress_not_initialized",
            SessionError::TerminalStatus { .. } => "terminal_status",
            SessionError::Validation { .. } => "validation_error",
            SessionError::InvalidPhase(_) => "invalid_phase",
            SessionError::InvalidStatus(_) => "invalid_status",
            SessionError::PlanNotFound(_) => "plan_not_found",
            SessionError::InvalidPlan(_) => "invalid_plan",
            SessionError::TaskNotFound(_) => "task_not_found",
            SessionError::TaskBlocked { .. } => "task_blocked",
            SessionError::Index(_) => "index_error",
            SessionError::Io(_) => "io_error",
            SessionError::Yaml(_) => "yaml_error",
            SessionError::Json(_) => "json_error",
        }
    }

    /// Structured detail: the offending field and current vs. requested values.
    pub fn details(&self) -> serde_json::Value {
        match self {
            SessionError::SessionNotFound { session_id, path } => {
                json!({ "session_id": session_id, "path": path })
            }
            SessionError::SessionExists(id) => json!({ "session_id": id }),
            SessionError::InvalidSessionId(id) => json!({ "field": "session_id", "value": id }),
            SessionError::InvalidManifest { path, reason } => {
                json!({ "path": path, "reason": reason })
            }
            SessionError::InvalidTransition { from, to, allowed } => json!({
                "field": "current_phase",
                "current": from,
                "requested": to,
                "allowed": allowed,
            }),
            SessionError::InvalidCheckpoint {
                checkpoint,
                expected,
                reason,
            } => json!({
                "field": "checkpoint_id",
                "requested": checkpoint,
                "expected": expected,
                "reason": reason,
            }),
            SessionError::VerificationFailed {
                checkpoint,
                failed_steps,
                incomplete_tasks,
            } => json!({
                "checkpoint": checkpoint,
                "failed_steps": failed_steps,
                "incomplete_tasks": incomplete_tasks,
                "override_allowed": true,
            }),
            SessionError::ProgressAlreadyInitialized {
                existing,
                requested,
            } => json!({
                "field": "checkpoints_total",
                "current": existing,
                "requested": requested,
            }),
            SessionError::ProgressNotInitialized => json!({ "field": "build_progress" }),
            SessionError::TerminalStatus { current, requested } => json!({
                "field": "status",
                "current": current,
                "requested": requested,
            }),
            SessionError::Validation { field, reason } => {
                json!({ "field": field, "reason": reason })
            }
            SessionError::InvalidPhase(v) => json!({ "field": "phase", "value": v }),
            SessionError::InvalidStatus(v) => json!({ "field": "status", "value": v }),
            SessionError::PlanNotFound(id) => json!({ "session_id": id }),
            SessionError::InvalidPlan(reason) => json!({ "reason": reason }),
            SessionError::TaskNotFound(id) => json!({ "task_id": id }),
            SessionError::TaskBlocked { task, waiting_on } => {
                json!({ "task_id": task, "waiting_on": waiting_on })
            }
            other => json!({ "message": other.to_string() }),
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
