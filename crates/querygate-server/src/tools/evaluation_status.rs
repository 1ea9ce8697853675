use super::{ToolContext, ToolError};
use anyhow::Result;
use querygate_core::LifecycleError;
use serde_json::Value;

pub async fn evaluation_status(ctx: &ToolContext, args: &Value) -> Result<Value> {
    // accept both 42 and "42"
    let id = match args.get("query_log_id") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    let Some(id) = id else {
        return ToolError::new("E_INVALID_ARGS", "'query_log_id' must be an integer").result();
    };

    match ctx.service.evaluation_status(id).await {
        Ok(view) => Ok(serde_json::to_value(view)?),
        Err(LifecycleError::NotFound(id)) => {
            ToolError::new("E_NOT_FOUND", &format!("query log {} not found", id)).result()
        }
        Err(e) => ToolError::new("E_STORAGE", &e.to_string()).result(),
    }
}
