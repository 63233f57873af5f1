use super::{required_str, required_u32, SessionTool, ToolContext, ToolError};
use serde_json::Value;

pub struct StartCheckpointTool;

impl SessionTool for StartCheckpointTool {
    fn name(&self) -> &str {
        "session_start_checkpoint"
    }

    fn description(&self) -> &str {
        "Start a checkpoint. Only the current checkpoint or the lowest uncompleted one may be started"
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": { "type": "string" },
                "checkpoint_id": { "type": "integer", "minimum": 1 }
            },
            "required": ["session_id", "checkpoint_id"]
        })
    }

    fn call(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let session_id = required_str(&args, "session_id")?;
        let checkpoint = required_u32(&args, "checkpoint_id")?;
        let progress = ctx.manager()?.start_checkpoint(session_id, checkpoint)?;
        Ok(serde_json::json!({
            "session_id": session_id,
            "current_checkpoint": progress.current_checkpoint,
            "checkpoints_completed": progress.checkpoints_completed,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{executing_session, planned_session, setup};
    use session_core::plan::ExecutionPlan;
    use session_core::types::TaskStatus;

    fn start(ctx: &ToolContext, cp: u32) -> Result<Value, ToolError> {
        StartCheckpointTool.call(
            serde_json::json!({"session_id": "s1", "checkpoint_id": cp}),
            ctx,
        )
    }

    #[test]
    fn starts_current_checkpoint() {
        let (_dir, ctx) = setup();
        executing_session(&ctx, "s1", 3);
        assert_eq!(start(&ctx, 1).unwrap()["current_checkpoint"], 1);
    }

    #[test]
    fn out_of_sequence_reports_expected() {
        let (_dir, ctx) = setup();
        executing_session(&ctx, "s1", 3);

        let err = start(&ctx, 3).unwrap_err();
        assert_eq!(err.error, "invalid_checkpoint");
        assert_eq!(err.details["requested"], 3);
        assert_eq!(err.details["expected"], 1);
    }

    #[test]
    fn marks_plan_checkpoint_in_progress() {
        let (dir, ctx) = setup();
        planned_session(&ctx, "s1");

        start(&ctx, 1).unwrap();
        let plan = ExecutionPlan::load(dir.path(), "s1").unwrap();
        assert_eq!(plan.checkpoint(1).unwrap().status, TaskStatus::InProgress);
    }

    #[test]
    fn uninitialized_progress_rejected() {
        let (_dir, ctx) = setup();
        crate::tools::test_support::create_session(&ctx, "s1");
        let err = start(&ctx, 1).unwrap_err();
        assert_eq!(err.error, "progress_not_initialized");
    }
}
