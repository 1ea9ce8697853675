use serde_json::Value;
use std::sync::Arc;

use crate::cache::ServerCaches;
use crate::config::ServerConfig;
use querygate_core::QueryService;

pub struct ToolContext {
    pub service: Arc<QueryService>,
    pub cfg: ServerConfig,
    pub caches: ServerCaches,
}

impl ToolContext {
    pub fn new(service: Arc<QueryService>, cfg: ServerConfig) -> Self {
        let caches = ServerCaches::new(cfg.cache_entries);
        Self {
            service,
            cfg,
            caches,
        }
    }
}

#[derive(serde::Serialize)]
pub struct ToolError {
    pub code: String,
    pub message: String,
}

impl ToolError {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    pub fn result(self) -> anyhow::Result<Value> {
        Ok(serde_json::json!({ "error": self }))
    }
}

/// Reads a required string argument, enforcing the per-field size limit.
pub(crate) fn str_arg<'a>(
    ctx: &ToolContext,
    args: &'a Value,
    name: &str,
) -> Result<&'a str, ToolError> {
    let v = args
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::new("E_INVALID_ARGS", &format!("Missing '{}' argument", name)))?;
    if v.len() > ctx.cfg.max_field_bytes {
        return Err(ToolError::new(
            "E_LIMIT_EXCEEDED",
            &format!("{} bytes={} > max={}", name, v.len(), ctx.cfg.max_field_bytes),
        ));
    }
    Ok(v)
}

pub mod analysis_report;
pub mod evaluation_status;
pub mod health_check;
pub mod query_submit;
pub mod sql_validate;

pub fn list_tools() -> Vec<Value> {
    vec![
        serde_json::json!({
            "name": "query_submit",
            "description": "Translate a natural-language question to SQL, validate and run it.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": { "type": "string", "maxLength": 500 }
                },
                "required": ["query"]
            }
        }),
        serde_json::json!({
            "name": "evaluation_status",
            "description": "Look up the evaluation status and scores of a logged query.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query_log_id": { "type": "integer" }
                },
                "required": ["query_log_id"]
            }
        }),
        serde_json::json!({
            "name": "analysis_report",
            "description": "Aggregate scores, weak queries and recommendations over all logged queries.",
            "inputSchema": { "type": "object", "properties": {} }
        }),
        serde_json::json!({
            "name": "health_check",
            "description": "Report database reachability and connection pool occupancy.",
            "inputSchema": { "type": "object", "properties": {} }
        }),
        serde_json::json!({
            "name": "sql_validate",
            "description": "Check a SQL statement against the validation policy without running it.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "sql": { "type": "string" }
                },
                "required": ["sql"]
            }
        }),
    ]
}

pub async fn handle_call(ctx: &ToolContext, name: &str, args: &Value) -> anyhow::Result<Value> {
    match name {
        "query_submit" => query_submit::query_submit(ctx, args).await,
        "evaluation_status" => evaluation_status::evaluation_status(ctx, args).await,
        "analysis_report" => analysis_report::analysis_report(ctx, args).await,
        "health_check" => health_check::health_check(ctx, args).await,
        "sql_validate" => sql_validate::sql_validate(ctx, args).await,
        _ => Err(anyhow::anyhow!("Unknown tool: {}", name)),
    }
}
