use super::{optional_str, required_enum, required_str, SessionTool, ToolContext, ToolError};
use serde_json::Value;
use session_core::types::TaskStatus;

pub struct UpdateTaskTool;

impl SessionTool for UpdateTaskTool {
    fn name(&self) -> &str {
        "session_update_task"
    }

    fn description(&self) -> &str {
        "Set the status of a plan task. Starting or completing a task requires its dependencies \
         to be complete; blocking requires a reason"
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": { "type": "string" },
                "task_id": { "type": "string" },
                "status": {
                    "type": "string",
                    "enum": ["pending", "in_progress", "complete", "blocked"]
                },
                "blocker": {
                    "type": "string",
                    "description": "Why the task is blocked (required for status=blocked)"
                }
            },
            "required": ["session_id", "task_id", "status"]
        })
    }

    fn call(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let session_id = required_str(&args, "session_id")?;
        let task_id = required_str(&args, "task_id")?;
        let status: TaskStatus = required_enum(&args, "status")?;
        let blocker = optional_str(&args, "blocker")?;

        let task = ctx
            .manager()?
            .update_task(session_id, task_id, status, blocker)?;
        Ok(serde_json::json!({ "session_id": session_id, "task": task }))
    }
}
