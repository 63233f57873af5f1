use super::{required_str, to_value, SessionTool, ToolContext, ToolError};
use serde_json::Value;

pub struct GetTool;

impl SessionTool for GetTool {
    fn name(&self) -> &str {
        "session_get"
    }

    fn description(&self) -> &str {
        "Read a session manifest with the current checkpoint's task readiness"
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "Session id (directory name under agents/sessions)"
                }
            },
            "required": ["session_id"]
        })
    }

    fn call(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let session_id = required_str(&args, "session_id")?;
        let view = ctx.manager()?.view(session_id)?;
        to_value(&view)
    }
}
