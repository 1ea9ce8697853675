use crate::tools::{self, ToolContext};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

static RID: AtomicU64 = AtomicU64::new(1);

fn next_rid() -> String {
    let n = RID.fetch_add(1, Ordering::Relaxed);
    format!("r-{n:06}")
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Option<Value>,
    id: Option<Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Option<Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcResponse {
    fn ok(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError { code, message }),
            id,
        }
    }
}

/// Wraps a tool result as `{content: [{type: "text", text}], isError}`.
fn tool_result(id: Option<Value>, res: &Value) -> JsonRpcResponse {
    let is_error = res.get("error").is_some_and(|e| !e.is_null());
    let text = serde_json::to_string_pretty(res).unwrap_or_default();
    JsonRpcResponse::ok(
        id,
        serde_json::json!({
            "content": [ { "type": "text", "text": text } ],
            "isError": is_error
        }),
    )
}

fn app_error(code: &str, message: String) -> Value {
    serde_json::json!({ "error": { "code": code, "message": message } })
}

pub struct Server;

impl Server {
    /// Serves on the process stdio until stdin closes, then drains the
    /// evaluation queue.
    pub async fn run(ctx: ToolContext) -> Result<()> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        let res = Self::serve(&ctx, stdin, stdout).await;
        ctx.service.shutdown().await;
        res
    }

    pub async fn serve<R, W>(ctx: &ToolContext, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let Some(resp) = Self::handle_line(ctx, &line).await else {
                continue;
            };
            let mut out = serde_json::to_string(&resp)?;
            out.push('\n');
            writer.write_all(out.as_bytes()).await?;
            writer.flush().await?;
        }
        tracing::info!(event = "stdin_closed");
        Ok(())
    }

    async fn handle_line(ctx: &ToolContext, line: &str) -> Option<JsonRpcResponse> {
        let rid = next_rid();
        let cfg = &ctx.cfg;

        if line.len() > cfg.max_msg_bytes {
            tracing::warn!(
                event = "limit_exceeded",
                rid = %rid,
                bytes_in = line.len(),
                max = cfg.max_msg_bytes
            );
            let err = app_error(
                "E_LIMIT_EXCEEDED",
                format!("message bytes={} > max={}", line.len(), cfg.max_msg_bytes),
            );
            return Some(tool_result(None, &err));
        }

        if line.trim().is_empty() {
            return None;
        }

        let req: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(event = "json_parse_error", rid = %rid, error = %e);
                return Some(JsonRpcResponse::error(None, -32700, format!("Parse error: {e}")));
            }
        };

        let resp = match req.method.as_str() {
            "initialize" => JsonRpcResponse::ok(
                req.id,
                serde_json::json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": { "tools": {} },
                    "serverInfo": {
                        "name": "querygate-server",
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }),
            ),
            "notifications/initialized" => {
                tracing::info!(event = "initialized", rid = %rid);
                return None;
            }
            "tools/list" => JsonRpcResponse::ok(
                req.id,
                serde_json::json!({ "tools": tools::list_tools() }),
            ),
            "tools/call" => match req.params {
                Some(params) => Self::call_tool(ctx, &rid, req.id, &params).await,
                None => JsonRpcResponse::error(req.id, -32602, "Missing params".to_string()),
            },
            _ => JsonRpcResponse::error(
                req.id,
                -32601,
                format!("Method not found: {}", req.method),
            ),
        };
        Some(resp)
    }

    async fn call_tool(
        ctx: &ToolContext,
        rid: &str,
        id: Option<Value>,
        params: &Value,
    ) -> JsonRpcResponse {
        let name = params.get("name").and_then(|s| s.as_str()).unwrap_or("");
        let default_args = serde_json::json!({});
        let args = params.get("arguments").unwrap_or(&default_args);
        let timeout_ms = ctx.cfg.timeout_ms;
        let start = std::time::Instant::now();

        tracing::info!(event = "tool_call_start", rid = %rid, rpc_id = ?id, tool = name);

        let result = match timeout(
            Duration::from_millis(timeout_ms),
            tools::handle_call(ctx, name, args),
        )
        .await
        {
            Ok(res) => res,
            Err(_) => {
                tracing::warn!(
                    event = "tool_call_timeout",
                    rid = %rid,
                    tool = name,
                    duration_ms = start.elapsed().as_millis() as u64,
                    code = "E_TIMEOUT"
                );
                Ok(app_error(
                    "E_TIMEOUT",
                    format!("Request exceeded {}ms", timeout_ms),
                ))
            }
        };

        let dur = start.elapsed().as_millis() as u64;
        match result {
            Ok(res) => {
                let code = res
                    .get("error")
                    .and_then(|e| e.get("code"))
                    .and_then(|c| c.as_str())
                    .unwrap_or("");
                tracing::info!(
                    event = "tool_call_done",
                    rid = %rid,
                    tool = name,
                    duration_ms = dur,
                    outcome = if code.is_empty() { "ok" } else { "app_error" },
                    code
                );
                tool_result(id, &res)
            }
            Err(e) => {
                tracing::error!(
                    event = "tool_call_crash",
                    rid = %rid,
                    tool = name,
                    duration_ms = dur,
                    error = %e
                );
                tool_result(id, &app_error("E_INTERNAL", e.to_string()))
            }
        }
    }
}
