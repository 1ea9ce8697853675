use super::ToolContext;
use anyhow::Result;
use serde_json::Value;

pub async fn health_check(ctx: &ToolContext, _args: &Value) -> Result<Value> {
    let health = ctx.service.health().await;
    Ok(serde_json::to_value(health)?)
}
