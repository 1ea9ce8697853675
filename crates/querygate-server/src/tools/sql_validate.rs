use super::{str_arg, ToolContext};
use anyhow::Result;
use serde_json::Value;

pub async fn sql_validate(ctx: &ToolContext, args: &Value) -> Result<Value> {
    let sql = match str_arg(ctx, args, "sql") {
        Ok(s) => s,
        Err(e) => return e.result(),
    };

    let key = crate::cache::sha256_hex(sql.as_bytes());
    let verdict = if let Some(v) = ctx.caches.verdicts.get(&key) {
        tracing::debug!(event = "cache_hit", key = %key, cache = "verdicts");
        v
    } else {
        tracing::debug!(event = "cache_miss", key = %key, cache = "verdicts");
        let v = ctx.service.validator().validate(sql);
        ctx.caches.verdicts.insert(key, v.clone());
        v
    };

    Ok(match verdict {
        Ok(()) => serde_json::json!({ "valid": true }),
        Err(e) => serde_json::json!({
            "valid": false,
            "error": {
                "code": e.kind(),
                "message": e.to_string(),
            }
        }),
    })
}
