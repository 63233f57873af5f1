use crate::tools::{self, SessionTool, ToolContext};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use session_core::{config::Config, sync::SyncQueue};
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// JSON-RPC 2.0 protocol types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Serialize)]
struct ToolContent {
    r#type: &'static str,
    text: String,
}

#[derive(Debug, Serialize)]
struct ToolCallResult {
    content: Vec<ToolContent>,
    #[serde(rename = "isError")]
    is_error: bool,
}

// ---------------------------------------------------------------------------
// Server loop
// ---------------------------------------------------------------------------

pub fn run(root: &Path) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load agents/config.yaml")?;
    let engine = super::open_engine(root, &config)?;

    // Key transitions enqueue index syncs; a background worker drains them.
    let rt = tokio::runtime::Runtime::new()?;
    let (queue, worker) = SyncQueue::channel(config.sync.queue_capacity);
    let cancel = CancellationToken::new();
    let worker_handle = rt.spawn(worker.run(engine.clone(), cancel.clone()));

    let ctx = ToolContext::new(root).with_sync(engine, Arc::new(queue));
    let tools = tools::all_tools();
    tracing::info!(root = %root.display(), tools = tools.len(), "mcp server ready");

    let served = serve(&ctx, &tools);

    // Dropping the context closes the queue; the worker drains what is left.
    drop(ctx);
    match rt.block_on(worker_handle) {
        Ok(stats) => tracing::info!(synced = stats.synced, failed = stats.failed, "sync worker stopped"),
        Err(e) => tracing::warn!(error = %e, "sync worker ended abnormally"),
    }
    served
}

fn serve(ctx: &ToolContext, tools: &[Box<dyn SessionTool>]) -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let raw: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                write_response(&stdout, &error_response(None, -32700, format!("parse error: {e}")))?;
                continue;
            }
        };

        // Notifications have no "id" key and get no response
        if !raw
            .as_object()
            .map(|o| o.contains_key("id"))
            .unwrap_or(false)
        {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_value(raw) {
            Ok(r) => r,
            Err(e) => {
                write_response(&stdout, &error_response(None, -32600, format!("invalid request: {e}")))?;
                continue;
            }
        };

        let response = handle_request(&request, tools, ctx);
        write_response(&stdout, &response)?;
    }

    Ok(())
}

fn write_response(stdout: &std::io::Stdout, resp: &JsonRpcResponse) -> anyhow::Result<()> {
    let mut out = stdout.lock();
    serde_json::to_writer(&mut out, resp)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

fn error_response(id: Option<Value>, code: i32, message: String) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(JsonRpcError { code, message }),
    }
}

// ---------------------------------------------------------------------------
// Request dispatch
// ---------------------------------------------------------------------------

pub fn handle_request(
    req: &JsonRpcRequest,
    tools: &[Box<dyn SessionTool>],
    ctx: &ToolContext,
) -> JsonRpcResponse {
    let id = req.id.clone();
    match req.method.as_str() {
        "initialize" => JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: Some(serde_json::json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": "sessions",
                    "version": env!("CARGO_PKG_VERSION")
                }
            })),
            error: None,
        },

        "tools/list" => {
            let tool_list: Vec<Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name(),
                        "description": t.description(),
                        "inputSchema": t.schema()
                    })
                })
                .collect();
            JsonRpcResponse {
                jsonrpc: "2.0",
                id,
                result: Some(serde_json::json!({ "tools": tool_list })),
                error: None,
            }
        }

        "tools/call" => {
            let Some(params) = &req.params else {
                return error_response(id, -32602, "missing params".to_string());
            };
            let Some(tool_name) = params["name"].as_str() else {
                return error_response(id, -32602, "missing tool name in params".to_string());
            };
            let Some(tool) = tools.iter().find(|t| t.name() == tool_name) else {
                return error_response(id, -32601, format!("tool not found: {tool_name}"));
            };

            let args = params.get("arguments").cloned().unwrap_or(Value::Null);
            let (body, is_error) = match tool.call(args, ctx) {
                Ok(v) => (v, false),
                Err(e) => {
                    tracing::info!(tool = tool_name, error = %e.error, "tool call failed");
                    (e.to_json(), true)
                }
            };
            let text = serde_json::to_string_pretty(&body)
                .unwrap_or_else(|e| format!("serialization error: {e}"));

            let call_result = ToolCallResult {
                content: vec![ToolContent {
                    r#type: "text",
                    text,
                }],
                is_error,
            };

            JsonRpcResponse {
                jsonrpc: "2.0",
                id,
                result: Some(
                    serde_json::to_value(&call_result)
                        .unwrap_or_else(|e| serde_json::json!({"error": e.to_string()})),
                ),
                error: None,
            }
        }

        other => error_response(id, -32601, format!("method not found: {other}")),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
