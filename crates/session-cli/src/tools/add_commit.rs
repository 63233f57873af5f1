use super::{optional_u32, required_str, SessionTool, ToolContext, ToolError};
use serde_json::Value;

pub struct AddCommitTool;

impl SessionTool for AddCommitTool {
    fn name(&self) -> &str {
        "session_add_commit"
    }

    fn description(&self) -> &str {
        "Record a git commit on a session, optionally tied to a checkpoint"
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": { "type": "string" },
                "sha": { "type": "string" },
                "message": { "type": "string" },
                "checkpoint": { "type": "integer", "minimum": 1 }
            },
            "required": ["session_id", "sha", "message"]
        })
    }

    fn call(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let session_id = required_str(&args, "session_id")?;
        let sha = required_str(&args, "sha")?;
        let message = required_str(&args, "message")?;
        let checkpoint = optional_u32(&args, "checkpoint")?;

        let commits = ctx
            .manager()?
            .add_commit(session_id, sha, message, checkpoint)?;
        Ok(serde_json::json!({
            "session_id": session_id,
            "commits": commits,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{create_session, executing_session, setup};

    #[test]
    fn appends_in_order() {
        let (_dir, ctx) = setup();
        create_session(&ctx, "s1");

        for (sha, msg) in [("abc123", "first"), ("def456", "second")] {
            AddCommitTool
                .call(
                    serde_json::json!({"session_id": "s1", "sha": sha, "message": msg}),
                    &ctx,
                )
                .unwrap();
        }
        let out = AddCommitTool
            .call(
                serde_json::json!({"session_id": "s1", "sha": " 789fed ", "message": "third"}),
                &ctx,
            )
            .unwrap();
        let shas: Vec<&str> = out["commits"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["sha"].as_str().unwrap())
            .collect();
        assert_eq!(shas, ["abc123", "def456", "789fed"]);
    }

    #[test]
    fn empty_message_is_validation_error() {
        let (_dir, ctx) = setup();
        create_session(&ctx, "s1");
        let err = AddCommitTool
            .call(
                serde_json::json!({"session_id": "s1", "sha": "abc", "message": "   "}),
                &ctx,
            )
            .unwrap_err();
        assert_eq!(err.error, "validation_error");
        assert_eq!(err.details["field"], "message");
    }

    #[test]
    fn checkpoint_reference_is_checked() {
        let (_dir, ctx) = setup();
        executing_session(&ctx, "s1", 2);
        let out = AddCommitTool
            .call(
                serde_json::json!({"session_id": "s1", "sha": "abc", "message": "m", "checkpoint": 1}),
                &ctx,
            )
            .unwrap();
        assert_eq!(out["commits"][0]["checkpoint"], 1);

        let err = AddCommitTool
            .call(
                serde_json::json!({"session_id": "s1", "sha": "abc", "message": "m", "checkpoint": 9}),
                &ctx,
            )
            .unwrap_err();
        assert_eq!(err.error, "validation_error");
        assert_eq!(err.details["field"], "checkpoint");
    }
}
