use super::{ToolContext, ToolError};
use anyhow::Result;
use serde_json::Value;

pub async fn analysis_report(ctx: &ToolContext, _args: &Value) -> Result<Value> {
    match ctx.service.analysis().await {
        Ok(report) => Ok(serde_json::to_value(report)?),
        Err(e) => {
            tracing::error!(event = "analysis_report_failed", error = %e);
            ToolError::new("E_STORAGE", &format!("Failed to generate analysis report: {e}")).result()
        }
    }
}
