use serde::Serialize;
use serde_json::Value;
use session_core::config::Config;
use session_core::sync::{SyncEngine, SyncTrigger};
use session_core::{SessionError, StateManager};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

pub mod add_commit;
pub mod complete_checkpoint;
pub mod get;
pub mod init_execution_progress;
pub mod onboard_all;
pub mod set_git_context;
pub mod set_status;
pub mod start_checkpoint;
pub mod sync_one;
pub mod transition_phase;
pub mod update_task;

pub trait SessionTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn schema(&self) -> Value;
    fn call(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError>;
}

pub fn all_tools() -> Vec<Box<dyn SessionTool>> {
    vec![
        Box::new(get::GetTool),
        Box::new(transition_phase::TransitionPhaseTool),
        Box::new(init_execution_progress::InitExecutionProgressTool),
        Box::new(start_checkpoint::StartCheckpointTool),
        Box::new(complete_checkpoint::CompleteCheckpointTool),
        Box::new(add_commit::AddCommitTool),
        Box::new(set_status::SetStatusTool),
        Box::new(set_git_context::SetGitContextTool),
        Box::new(update_task::UpdateTaskTool),
        Box::new(sync_one::SyncOneTool),
        Box::new(onboard_all::OnboardAllTool),
    ]
}

// ---------------------------------------------------------------------------
// ToolError
// ---------------------------------------------------------------------------

/// Structured failure returned to tool callers as
/// `{"error": kind, "message": text, "details": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolError {
    pub error: String,
    pub message: String,
    pub details: Value,
}

impl ToolError {
    pub fn invalid_argument(field: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            error: "validation_error".to_string(),
            message: format!("invalid argument {field}: {reason}"),
            details: serde_json::json!({ "field": field, "reason": reason }),
        }
    }

    pub fn missing(field: &str) -> Self {
        Self::invalid_argument(field, "missing required argument")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            error: "internal_error".to_string(),
            message: message.into(),
            details: Value::Object(Default::default()),
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({ "error": self.error, "message": self.message })
        })
    }
}

impl From<SessionError> for ToolError {
    fn from(e: SessionError) -> Self {
        Self {
            error: e.kind().to_string(),
            message: e.to_string(),
            details: e.details(),
        }
    }
}

// ---------------------------------------------------------------------------
// ToolContext
// ---------------------------------------------------------------------------

/// What a tool call may touch: the project root plus, inside the MCP server,
/// the shared index engine and sync queue.
pub struct ToolContext {
    root: PathBuf,
    engine: Option<SyncEngine>,
    trigger: Option<Arc<dyn SyncTrigger>>,
}

impl ToolContext {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            engine: None,
            trigger: None,
        }
    }

    pub fn with_sync(mut self, engine: SyncEngine, trigger: Arc<dyn SyncTrigger>) -> Self {
        self.engine = Some(engine);
        self.trigger = Some(trigger);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manager(&self) -> Result<StateManager, ToolError> {
        let mgr = StateManager::open(&self.root)?;
        Ok(match &self.trigger {
            Some(trigger) => mgr.with_trigger(trigger.clone()),
            None => mgr,
        })
    }

    /// The shared engine, or one opened on the configured index for `root`.
    pub fn engine_for(&self, root: &Path) -> Result<SyncEngine, ToolError> {
        if root == self.root {
            if let Some(engine) = &self.engine {
                return Ok(engine.clone());
            }
        }
        let config = Config::load(root)?;
        crate::cmd::open_engine(root, &config).map_err(|e| ToolError::internal(format!("{e:#}")))
    }
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

pub(crate) fn required_str<'a>(args: &'a Value, field: &str) -> Result<&'a str, ToolError> {
    match &args[field] {
        Value::String(s) => Ok(s),
        Value::Null => Err(ToolError::missing(field)),
        _ => Err(ToolError::invalid_argument(field, "expected a string")),
    }
}

pub(crate) fn optional_str<'a>(args: &'a Value, field: &str) -> Result<Option<&'a str>, ToolError> {
    match &args[field] {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        _ => Err(ToolError::invalid_argument(field, "expected a string")),
    }
}

pub(crate) fn optional_u32(args: &Value, field: &str) -> Result<Option<u32>, ToolError> {
    match &args[field] {
        Value::Null => Ok(None),
        v => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| ToolError::invalid_argument(field, "expected a non-negative integer")),
    }
}

pub(crate) fn required_u32(args: &Value, field: &str) -> Result<u32, ToolError> {
    optional_u32(args, field)?.ok_or_else(|| ToolError::missing(field))
}

/// Parse a string argument into one of the session enums.
pub(crate) fn required_enum<T>(args: &Value, field: &str) -> Result<T, ToolError>
where
    T: FromStr<Err = SessionError>,
{
    Ok(required_str(args, field)?.parse::<T>()?)
}

pub(crate) fn to_value<T: Serialize>(value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::internal(format!("serialization error: {e}")))
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test_support {
    use super::ToolContext;
    use session_core::{
        paths,
        types::{Phase, SessionType},
        StateManager,
    };
    use tempfile::TempDir;

    pub fn setup() -> (TempDir, ToolContext) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(paths::sessions_dir(dir.path())).unwrap();
        let ctx = ToolContext::new(dir.path());
        (dir, ctx)
    }

    pub fn create_session(ctx: &ToolContext, id: &str) {
        StateManager::open(ctx.root())
            .unwrap()
            .create_session(id, "Auth flow", None, SessionType::Full)
            .unwrap();
    }

    /// Session in the execute phase with `total` checkpoints initialised.
    pub fn executing_session(ctx: &ToolContext, id: &str, total: u32) {
        create_session(ctx, id);
        enter_execute(ctx, id, total);
    }

    /// Executing session driven by the plan from [`write_plan`].
    pub fn planned_session(ctx: &ToolContext, id: &str) {
        create_session(ctx, id);
        write_plan(ctx, id);
        enter_execute(ctx, id, 2);
    }

    fn enter_execute(ctx: &ToolContext, id: &str, total: u32) {
        let mgr = StateManager::open(ctx.root()).unwrap();
        mgr.transition_phase(id, Phase::Design).unwrap();
        mgr.transition_phase(id, Phase::Execute).unwrap();
        mgr.init_execution_progress(id, total).unwrap();
    }

    /// Two-checkpoint plan: 1 = {t1, t2[t1]} verified by `cargo test`,
    /// 2 = {t3[t2]} verified by `cargo test` and `cargo clippy`.
    pub fn write_plan(ctx: &ToolContext, id: &str) {
        let plan = serde_json::json!({
            "session_id": id,
            "spec_reference": "spec.md",
            "created_at": "2026-02-14T10:00:00Z",
            "updated_at": "2026-02-14T10:00:00Z",
            "status": "draft",
            "checkpoints": [
                {
                    "id": 1,
                    "title": "Token store",
                    "testing_strategy": {
                        "approach": "unit",
                        "verification_steps": ["cargo test"]
                    },
                    "task_groups": [{
                        "id": "g1",
                        "title": "Storage",
                        "tasks": [
                            {"id": "t1", "title": "Schema"},
                            {"id": "t2", "title": "Queries", "depends_on": ["t1"]}
                        ]
                    }]
                },
                {
                    "id": 2,
                    "title": "Login endpoint",
                    "prerequisites": [1],
                    "testing_strategy": {
                        "approach": "integration",
                        "verification_steps": ["cargo test", "cargo clippy"]
                    },
                    "task_groups": [{
                        "id": "g2",
                        "title": "Handler",
                        "tasks": [
                            {"id": "t3", "title": "Route", "depends_on": ["t2"]}
                        ]
                    }]
                }
            ]
        });
        std::fs::write(
            paths::plan_path(ctx.root(), id),
            serde_json::to_string_pretty(&plan).unwrap(),
        )
        .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_error_maps_to_structured_error() {
        let err: ToolError = SessionError::TerminalStatus {
            current: "complete".to_string(),
            requested: "active".to_string(),
        }
        .into();
        assert_eq!(err.error, "terminal_status");
        let json = err.to_json();
        assert_eq!(json["error"], "terminal_status");
        assert!(json["message"].as_str().unwrap().contains("terminal"));
        assert!(json["details"].is_object());
    }

    #[test]
    fn argument_helpers_report_field() {
        let args = serde_json::json!({"session_id": 7, "checkpoint_id": -1});
        let err = required_str(&args, "session_id").unwrap_err();
        assert_eq!(err.details["field"], "session_id");
        assert!(required_u32(&args, "checkpoint_id").is_err());
        assert_eq!(required_str(&args, "missing").unwrap_err().error, "validation_error");
        assert_eq!(optional_u32(&args, "absent").unwrap(), None);
    }

    #[test]
    fn tool_names_are_unique_and_prefixed() {
        let tools = all_tools();
        let mut names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        assert!(names.iter().all(|n| n.starts_with("session_")));
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 11);
    }
}
