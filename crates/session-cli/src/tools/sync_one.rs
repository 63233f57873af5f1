use super::{required_str, to_value, SessionTool, ToolContext, ToolError};
use serde_json::Value;
use session_core::paths;
use std::path::{Path, PathBuf};

pub struct SyncOneTool;

impl SessionTool for SyncOneTool {
    fn name(&self) -> &str {
        "session_sync_one"
    }

    fn description(&self) -> &str {
        "Read one session manifest and upsert its row into the index"
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "manifest_location": {
                    "type": "string",
                    "description": "Session directory or its state.json. Relative paths resolve against the project root"
                }
            },
            "required": ["manifest_location"]
        })
    }

    fn call(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let location = PathBuf::from(required_str(&args, "manifest_location")?);
        let location = if location.is_absolute() {
            location
        } else {
            ctx.root().join(location)
        };
        let (session_dir, _) = paths::resolve_manifest_location(&location);
        let root = owning_root(&session_dir).unwrap_or(ctx.root()).to_path_buf();

        let record = ctx.engine_for(&root)?.sync_one(&location)?;
        to_value(&record)
    }
}

/// The project root of a session directory laid out as `<root>/agents/sessions/<id>`.
fn owning_root(session_dir: &Path) -> Option<&Path> {
    let sessions = session_dir.parent()?;
    let root = sessions.parent()?.parent()?;
    (paths::sessions_dir(root) == sessions).then_some(root)
}
