use super::{required_enum, required_str, SessionTool, ToolContext, ToolError};
use serde_json::Value;
use session_core::types::Status;

pub struct SetStatusTool;

impl SessionTool for SetStatusTool {
    fn name(&self) -> &str {
        "session_set_status"
    }

    fn description(&self) -> &str {
        "Set the advisory status of a session. complete and failed are terminal"
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": { "type": "string" },
                "status": {
                    "type": "string",
                    "enum": ["active", "paused", "complete", "failed"]
                }
            },
            "required": ["session_id", "status"]
        })
    }

    fn call(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let session_id = required_str(&args, "session_id")?;
        let status: Status = required_enum(&args, "status")?;
        let status = ctx.manager()?.set_status(session_id, status)?;
        Ok(serde_json::json!({ "session_id": session_id, "status": status }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{create_session, setup};

    fn set(ctx: &ToolContext, status: &str) -> Result<Value, ToolError> {
        SetStatusTool.call(serde_json::json!({"session_id": "s1", "status": status}), ctx)
    }

    #[test]
    fn pause_and_resume() {
        let (_dir, ctx) = setup();
        create_session(&ctx, "s1");
        assert_eq!(set(&ctx, "paused").unwrap()["status"], "paused");
        assert_eq!(set(&ctx, "active").unwrap()["status"], "active");
    }

    #[test]
    fn terminal_status_is_final() {
        let (_dir, ctx) = setup();
        create_session(&ctx, "s1");
        set(&ctx, "failed").unwrap();

        let err = set(&ctx, "active").unwrap_err();
        assert_eq!(err.error, "terminal_status");
        assert_eq!(err.details["current"], "failed");
        assert_eq!(err.details["requested"], "active");
    }

    #[test]
    fn unknown_status_rejected() {
        let (_dir, ctx) = setup();
        create_session(&ctx, "s1");
        assert_eq!(set(&ctx, "archived").unwrap_err().error, "invalid_status");
    }
}
