use super::exit_codes;
use crate::cli::args::ValidateArgs;
use querygate_core::config::AppConfig;
use querygate_core::validate::StatementValidator;
use serde_json::json;
use std::sync::Arc;

pub fn run(args: ValidateArgs, cfg: &AppConfig) -> anyhow::Result<i32> {
    let validator = StatementValidator::new(Arc::new(cfg.policy.clone()))?;
    let verdict = validator.validate(&args.sql);

    if args.format == "json" {
        let output = match &verdict {
            Ok(()) => json!({ "valid": true }),
            Err(e) => json!({
                "valid": false,
                "error": { "code": e.kind(), "message": e.to_string() }
            }),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        match &verdict {
            Ok(()) => println!("ok: statement allowed"),
            Err(e) => println!("rejected [{}]: {}", e.kind(), e),
        }
    }

    Ok(match verdict {
        Ok(()) => exit_codes::OK,
        Err(_) => exit_codes::QUERY_FAILED,
    })
}
