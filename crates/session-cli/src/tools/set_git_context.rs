use super::{optional_str, required_str, SessionTool, ToolContext, ToolError};
use serde_json::Value;

pub struct SetGitContextTool;

impl SessionTool for SetGitContextTool {
    fn name(&self) -> &str {
        "session_set_git_context"
    }

    fn description(&self) -> &str {
        "Update the branch, worktree, or base branch of a session. Omitted fields keep their value"
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": { "type": "string" },
                "branch": { "type": "string" },
                "worktree": { "type": "string" },
                "base_branch": { "type": "string" }
            },
            "required": ["session_id"]
        })
    }

    fn call(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let session_id = required_str(&args, "session_id")?;
        let git = ctx.manager()?.set_git_context(
            session_id,
            optional_str(&args, "branch")?,
            optional_str(&args, "worktree")?,
            optional_str(&args, "base_branch")?,
        )?;
        Ok(serde_json::json!({ "session_id": session_id, "git": git }))
    }
}
