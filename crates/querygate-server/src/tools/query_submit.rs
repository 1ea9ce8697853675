use super::{str_arg, ToolContext};
use anyhow::Result;
use serde_json::Value;

pub async fn query_submit(ctx: &ToolContext, args: &Value) -> Result<Value> {
    let query = match str_arg(ctx, args, "query") {
        Ok(q) => q,
        Err(e) => return e.result(),
    };

    let resp = ctx.service.submit(query).await;
    Ok(serde_json::to_value(resp)?)
}
