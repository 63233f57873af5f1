use super::{optional_str, required_str, required_u32, to_value, SessionTool, ToolContext, ToolError};
use serde_json::Value;
use session_core::gate::{VerificationOverride, VerificationResult};

pub struct CompleteCheckpointTool;

impl SessionTool for CompleteCheckpointTool {
    fn name(&self) -> &str {
        "session_complete_checkpoint"
    }

    fn description(&self) -> &str {
        "Complete the current checkpoint. Every declared verification step must pass and \
         every task must be complete, unless an override justification is given"
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": { "type": "string" },
                "checkpoint_id": { "type": "integer", "minimum": 1 },
                "verification": {
                    "type": "array",
                    "description": "Results of the verification steps the caller ran",
                    "items": {
                        "type": "object",
                        "properties": {
                            "step": { "type": "string" },
                            "passed": { "type": "boolean" },
                            "output": { "type": "string" }
                        },
                        "required": ["step", "passed"]
                    }
                },
                "override": {
                    "type": "string",
                    "description": "Justification for completing despite a failing gate; recorded as a dev note"
                }
            },
            "required": ["session_id", "checkpoint_id"]
        })
    }

    fn call(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let session_id = required_str(&args, "session_id")?;
        let checkpoint = required_u32(&args, "checkpoint_id")?;
        let results: Vec<VerificationResult> = match &args["verification"] {
            Value::Null => Vec::new(),
            v => serde_json::from_value(v.clone())
                .map_err(|e| ToolError::invalid_argument("verification", e.to_string()))?,
        };
        let override_ = optional_str(&args, "override")?
            .map(VerificationOverride::new)
            .transpose()?;

        let done = ctx.manager()?.complete_checkpoint(
            session_id,
            checkpoint,
            &results,
            override_.as_ref(),
        )?;
        to_value(&done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{executing_session, planned_session, setup};
    use session_core::{manifest::SessionManifest, plan::ExecutionPlan, types::NoteCategory};

    fn complete(ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        CompleteCheckpointTool.call(args, ctx)
    }

    #[test]
    fn passing_results_advance_progress() {
        let (_dir, ctx) = setup();
        executing_session(&ctx, "s1", 3);

        let out = complete(
            &ctx,
            serde_json::json!({
                "session_id": "s1",
                "checkpoint_id": 1,
                "verification": [{"step": "cargo test", "passed": true}]
            }),
        )
        .unwrap();
        assert_eq!(out["checkpoints_completed"], serde_json::json!([1]));
        assert_eq!(out["next_checkpoint"], 2);
        assert_eq!(out["gate"]["passed"], true);
    }

    #[test]
    fn failing_step_blocks_without_writing() {
        let (dir, ctx) = setup();
        executing_session(&ctx, "s1", 3);
        let path = session_core::paths::manifest_path(dir.path(), "s1");
        let before = std::fs::read(&path).unwrap();

        let err = complete(
            &ctx,
            serde_json::json!({
                "session_id": "s1",
                "checkpoint_id": 1,
                "verification": [{"step": "cargo test", "passed": false, "output": "1 failed"}]
            }),
        )
        .unwrap_err();
        assert_eq!(err.error, "verification_failed");
        assert_eq!(err.details["failed_steps"], serde_json::json!(["cargo test"]));
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn override_completes_and_records_note() {
        let (dir, ctx) = setup();
        executing_session(&ctx, "s1", 2);

        let out = complete(
            &ctx,
            serde_json::json!({
                "session_id": "s1",
                "checkpoint_id": 1,
                "verification": [{"step": "cargo test", "passed": false}],
                "override": "flaky upstream test, tracked separately"
            }),
        )
        .unwrap();
        assert_eq!(out["checkpoints_completed"], serde_json::json!([1]));
        assert_eq!(out["override_note"]["category"], "override");

        let m = SessionManifest::load(dir.path(), "s1").unwrap();
        let notes = session_core::notes::by_category(&m.dev_notes, NoteCategory::Override);
        assert_eq!(notes.len(), 1);
        assert!(notes[0].content.contains("flaky upstream test"));
    }

    #[test]
    fn blank_override_is_rejected() {
        let (_dir, ctx) = setup();
        executing_session(&ctx, "s1", 2);
        let err = complete(
            &ctx,
            serde_json::json!({
                "session_id": "s1",
                "checkpoint_id": 1,
                "verification": [{"step": "cargo test", "passed": false}],
                "override": "  "
            }),
        )
        .unwrap_err();
        assert_eq!(err.error, "validation_error");
    }

    #[test]
    fn plan_gate_reports_missing_steps_and_tasks() {
        let (dir, ctx) = setup();
        planned_session(&ctx, "s1");

        let err = complete(
            &ctx,
            serde_json::json!({"session_id": "s1", "checkpoint_id": 1}),
        )
        .unwrap_err();
        assert_eq!(err.error, "verification_failed");
        assert_eq!(
            err.details["failed_steps"],
            serde_json::json!(["cargo test (no result)"])
        );
        assert_eq!(err.details["incomplete_tasks"], serde_json::json!(["t1", "t2"]));

        let plan = ExecutionPlan::load(dir.path(), "s1").unwrap();
        assert!(!plan.checkpoint(1).unwrap().is_complete());
    }

    #[test]
    fn wrong_checkpoint_rejected() {
        let (_dir, ctx) = setup();
        executing_session(&ctx, "s1", 3);
        let err = complete(
            &ctx,
            serde_json::json!({"session_id": "s1", "checkpoint_id": 2}),
        )
        .unwrap_err();
        assert_eq!(err.error, "invalid_checkpoint");
        assert_eq!(err.details["expected"], 1);
    }

    #[test]
    fn malformed_verification_is_argument_error() {
        let (_dir, ctx) = setup();
        executing_session(&ctx, "s1", 1);
        let err = complete(
            &ctx,
            serde_json::json!({"session_id": "s1", "checkpoint_id": 1, "verification": "ok"}),
        )
        .unwrap_err();
        assert_eq!(err.details["field"], "verification");
    }
}
