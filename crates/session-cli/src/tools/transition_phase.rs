use super::{required_enum, required_str, to_value, SessionTool, ToolContext, ToolError};
use serde_json::Value;
use session_core::types::Phase;

pub struct TransitionPhaseTool;

impl SessionTool for TransitionPhaseTool {
    fn name(&self) -> &str {
        "session_transition_phase"
    }

    fn description(&self) -> &str {
        "Move a session to its next phase (intent → design → execute → document → complete; execute may go straight to complete)"
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": { "type": "string" },
                "new_phase": {
                    "type": "string",
                    "enum": ["intent", "design", "execute", "document", "complete"]
                }
            },
            "required": ["session_id", "new_phase"]
        })
    }

    fn call(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let session_id = required_str(&args, "session_id")?;
        let phase: Phase = required_enum(&args, "new_phase")?;
        let change = ctx.manager()?.transition_phase(session_id, phase)?;
        to_value(&change)
    }
}
