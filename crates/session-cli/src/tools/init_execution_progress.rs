use super::{required_str, required_u32, SessionTool, ToolContext, ToolError};
use serde_json::Value;

pub struct InitExecutionProgressTool;

impl SessionTool for InitExecutionProgressTool {
    fn name(&self) -> &str {
        "session_init_execution_progress"
    }

    fn description(&self) -> &str {
        "Start checkpoint tracking for a session. Repeating with the same total is a no-op"
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": { "type": "string" },
                "checkpoints_total": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Number of checkpoints in the execution plan"
                }
            },
            "required": ["session_id", "checkpoints_total"]
        })
    }

    fn call(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let session_id = required_str(&args, "session_id")?;
        let total = required_u32(&args, "checkpoints_total")?;
        let progress = ctx.manager()?.init_execution_progress(session_id, total)?;
        Ok(serde_json::json!({
            "session_id": session_id,
            "build_progress": progress,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{create_session, setup};

    fn init(ctx: &ToolContext, total: u32) -> Result<Value, ToolError> {
        InitExecutionProgressTool.call(
            serde_json::json!({"session_id": "s1", "checkpoints_total": total}),
            ctx,
        )
    }

    #[test]
    fn initializes_at_checkpoint_one() {
        let (_dir, ctx) = setup();
        create_session(&ctx, "s1");

        let out = init(&ctx, 3).unwrap();
        assert_eq!(out["build_progress"]["checkpoints_total"], 3);
        assert_eq!(out["build_progress"]["current_checkpoint"], 1);
        assert_eq!(out["build_progress"]["checkpoints_completed"], serde_json::json!([]));
    }

    #[test]
    fn same_total_is_idempotent_other_total_fails() {
        let (_dir, ctx) = setup();
        create_session(&ctx, "s1");
        init(&ctx, 3).unwrap();

        assert_eq!(init(&ctx, 3).unwrap()["build_progress"]["checkpoints_total"], 3);
        let err = init(&ctx, 5).unwrap_err();
        assert_eq!(err.error, "progress_already_initialized");
        assert_eq!(err.details["current"], 3);
        assert_eq!(err.details["requested"], 5);
    }

    #[test]
    fn zero_total_is_validation_error() {
        let (_dir, ctx) = setup();
        create_session(&ctx, "s1");
        let err = init(&ctx, 0).unwrap_err();
        assert_eq!(err.error, "validation_error");
        assert_eq!(err.details["field"], "checkpoints_total");
    }
}
