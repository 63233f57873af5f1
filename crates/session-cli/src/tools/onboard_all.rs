use super::{optional_str, optional_u32, to_value, SessionTool, ToolContext, ToolError};
use serde_json::Value;
use session_core::config::Config;
use session_core::sync::{OnboardOptions, OnboardSummary, SyncEngine};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

pub struct OnboardAllTool;

impl SessionTool for OnboardAllTool {
    fn name(&self) -> &str {
        "session_onboard_all"
    }

    fn description(&self) -> &str {
        "Sync every session under agents/sessions into the index. Per-session failures are \
         reported, never raised"
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "root": {
                    "type": "string",
                    "description": "Project root (default: the server's root)"
                },
                "max_parallel": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Concurrent manifest reads (default: sync.max_parallel)"
                }
            }
        })
    }

    fn call(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let root = optional_str(&args, "root")?
            .map(PathBuf::from)
            .unwrap_or_else(|| ctx.root().to_path_buf());
        let config = Config::load(&root)?;
        let mut options = OnboardOptions::from(&config);
        if let Some(n) = optional_u32(&args, "max_parallel")? {
            options.max_parallel = (n as usize).max(1);
        }
        let engine = ctx.engine_for(&root)?;

        let rt = match tokio::runtime::Handle::try_current() {
            Ok(_) => None,
            Err(_) => Some(
                tokio::runtime::Runtime::new()
                    .map_err(|e| ToolError::internal(format!("failed to create tokio runtime: {e}")))?,
            ),
        };
        let summary = match &rt {
            Some(rt) => rt.block_on(onboard(engine, &root, options)),
            None => tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current().block_on(onboard(engine, &root, options))
            }),
        }?;
        to_value(&summary)
    }
}

async fn onboard(
    engine: SyncEngine,
    root: &Path,
    options: OnboardOptions,
) -> Result<OnboardSummary, ToolError> {
    let cancel = CancellationToken::new();
    Ok(engine.onboard_all(root, &options, &cancel).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{create_session, setup};
    use session_core::paths;

    #[test]
    fn reports_synced_and_failed() {
        let (dir, ctx) = setup();
        create_session(&ctx, "s1");
        create_session(&ctx, "s2");
        let broken = paths::session_dir(dir.path(), "broken");
        std::fs::create_dir_all(&broken).unwrap();
        std::fs::write(broken.join("state.json"), "{ not json").unwrap();

        let out = OnboardAllTool
            .call(serde_json::json!({"max_parallel": 2}), &ctx)
            .unwrap();
        let synced: Vec<&str> = out["synced"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["session_id"].as_str().unwrap())
            .collect();
        assert_eq!(synced, ["s1", "s2"]);
        assert_eq!(out["failed"].as_array().unwrap().len(), 1);
        assert!(out["failed"][0]["location"].as_str().unwrap().ends_with("broken"));
    }

    #[test]
    fn explicit_root_is_used() {
        let (_dir, ctx) = setup();
        let (other, other_ctx) = setup();
        create_session(&other_ctx, "elsewhere");

        let out = OnboardAllTool
            .call(
                serde_json::json!({"root": other.path().display().to_string()}),
                &ctx,
            )
            .unwrap();
        assert_eq!(out["synced"][0]["session_id"], "elsewhere");
        assert!(other.path().join("agents/index.db").exists());
    }

    #[test]
    fn empty_project_is_empty_summary() {
        let (_dir, ctx) = setup();
        let out = OnboardAllTool.call(serde_json::json!({}), &ctx).unwrap();
        assert_eq!(out["synced"], serde_json::json!([]));
        assert_eq!(out["failed"], serde_json::json!([]));
    }
}
