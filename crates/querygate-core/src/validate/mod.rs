pub mod policy;
pub mod tables;

pub use policy::ValidationPolicy;

use crate::errors::ValidationError;
use regex::Regex;
use sqlparser::ast::{SetExpr, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::sync::Arc;
use std::time::{Duration, Instant};

const SLOW_VALIDATION: Duration = Duration::from_millis(50);

/// Allowlist gate in front of the executor.
///
/// A statement passes only if it parses as exactly one plain `SELECT`, carries
/// none of the blocked keywords anywhere in its raw text, and reads from the
/// permitted table and nothing else.
pub struct StatementValidator {
    policy: Arc<ValidationPolicy>,
    keyword_net: Option<Regex>,
    dialect: PostgreSqlDialect,
}

impl StatementValidator {
    pub fn new(policy: Arc<ValidationPolicy>) -> anyhow::Result<Self> {
        let keyword_net = build_keyword_net(&policy.blocked_keywords)?;
        Ok(Self {
            policy,
            keyword_net,
            dialect: PostgreSqlDialect {},
        })
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    pub fn validate(&self, sql: &str) -> Result<(), ValidationError> {
        self.validate_with_context(sql, None)
    }

    /// Same as [`validate`](Self::validate), with the originating question
    /// attached to the failure log.
    pub fn validate_with_context(
        &self,
        sql: &str,
        question: Option<&str>,
    ) -> Result<(), ValidationError> {
        let start = Instant::now();
        let verdict = self.check(sql);
        let elapsed = start.elapsed();

        if elapsed > SLOW_VALIDATION {
            tracing::warn!(
                event = "validation_slow",
                elapsed_ms = elapsed.as_millis() as u64,
                sql_len = sql.len(),
            );
        }

        match &verdict {
            Ok(()) => tracing::info!(
                event = "validation_complete",
                elapsed_us = elapsed.as_micros() as u64,
            ),
            Err(e) => tracing::warn!(
                event = "validation_failed",
                error_type = e.kind(),
                error = %e,
                sql = %sql,
                question = question.unwrap_or(""),
            ),
        }
        verdict
    }

    fn check(&self, sql: &str) -> Result<(), ValidationError> {
        let statements = self.check_statement_kind(sql)?;
        self.check_keywords(sql)?;
        self.check_tables(sql, &statements)
    }

    fn check_statement_kind(&self, sql: &str) -> Result<Vec<Statement>, ValidationError> {
        if sql.trim().is_empty() {
            return Err(ValidationError::SyntaxError {
                detail: "empty statement".into(),
            });
        }

        let statements =
            Parser::parse_sql(&self.dialect, sql).map_err(|e| ValidationError::SyntaxError {
                detail: e.to_string(),
            })?;

        match statements.as_slice() {
            [] => Err(ValidationError::SyntaxError {
                detail: "empty statement".into(),
            }),
            [Statement::Query(query)] => {
                if !query.locks.is_empty() {
                    return Err(ValidationError::NonSelectStatement {
                        detail: "row locking clause".into(),
                    });
                }
                if let SetExpr::Select(select) = query.body.as_ref() {
                    if select.into.is_some() {
                        return Err(ValidationError::NonSelectStatement {
                            detail: "SELECT INTO".into(),
                        });
                    }
                }
                Ok(statements)
            }
            [_] => Err(ValidationError::NonSelectStatement {
                detail: leading_word(sql),
            }),
            _ => Err(ValidationError::NonSelectStatement {
                detail: "multiple statements".into(),
            }),
        }
    }

    fn check_keywords(&self, sql: &str) -> Result<(), ValidationError> {
        let Some(net) = &self.keyword_net else {
            return Ok(());
        };
        match net.find(sql) {
            Some(m) => Err(ValidationError::DangerousKeyword {
                keyword: m.as_str().to_uppercase(),
            }),
            None => Ok(()),
        }
    }

    /// Every table either pass finds must be the permitted one.
    fn check_tables(&self, sql: &str, statements: &[Statement]) -> Result<(), ValidationError> {
        let mut tables = tables::referenced_tables(&self.dialect, sql).map_err(|e| {
            ValidationError::SyntaxError {
                detail: e.to_string(),
            }
        })?;
        for name in tables::relation_names(statements) {
            tables::push_unique(&mut tables, name);
        }
        let permitted = self.policy.normalized_table();

        let only_permitted =
            !tables.is_empty() && tables.iter().all(|t| t.as_str() == permitted.as_str());
        if only_permitted {
            Ok(())
        } else {
            Err(ValidationError::UnauthorizedTable { permitted, tables })
        }
    }
}

fn build_keyword_net(keywords: &[String]) -> anyhow::Result<Option<Regex>> {
    let alternatives: Vec<String> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(regex::escape)
        .collect();
    if alternatives.is_empty() {
        return Ok(None);
    }
    let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
    Ok(Some(Regex::new(&pattern)?))
}

fn leading_word(sql: &str) -> String {
    sql.split_whitespace()
        .next()
        .map(|w| w.to_uppercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> StatementValidator {
        StatementValidator::new(Arc::new(ValidationPolicy::default())).unwrap()
    }

    #[test]
    fn test_accepts_plain_select() {
        let v = validator();
        assert!(v.validate("SELECT * FROM employees").is_ok());
        assert!(v
            .validate("SELECT department, COUNT(*) FROM employees GROUP BY department")
            .is_ok());
        assert!(v
            .validate("SELECT first_name FROM employees WHERE hire_date >= '2020-01-01' LIMIT 5")
            .is_ok());
    }

    #[test]
    fn test_audit_columns_do_not_trip_keyword_net() {
        let v = validator();
        assert!(v
            .validate("SELECT created_at, updated_at FROM employees ORDER BY updated_at DESC")
            .is_ok());
    }

    #[test]
    fn test_empty_and_garbage_are_syntax_errors() {
        let v = validator();
        assert!(matches!(
            v.validate("   "),
            Err(ValidationError::SyntaxError { .. })
        ));
        assert!(matches!(
            v.validate("SELEC * FORM employees"),
            Err(ValidationError::SyntaxError { .. })
        ));
    }

    #[test]
    fn test_non_select_statements() {
        let v = validator();
        for sql in [
            "DeLeTe FrOm Employees",
            "update employees set salary_usd = 0",
            "DROP TABLE employees",
            "INSERT INTO employees (first_name) VALUES ('x')",
        ] {
            assert!(
                matches!(v.validate(sql), Err(ValidationError::NonSelectStatement { .. })),
                "{sql}"
            );
        }
    }

    #[test]
    fn test_multi_statement_smuggling() {
        let v = validator();
        let err = v
            .validate("SELECT * FROM employees; SELECT * FROM employees")
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::NonSelectStatement {
                detail: "multiple statements".into()
            }
        );
    }

    #[test]
    fn test_select_into_and_locking_rejected() {
        let v = validator();
        assert!(matches!(
            v.validate("SELECT * INTO copy FROM employees"),
            Err(ValidationError::NonSelectStatement { .. })
        ));
        assert!(matches!(
            v.validate("SELECT * FROM employees FOR UPDATE"),
            Err(ValidationError::NonSelectStatement { .. })
        ));
    }

    #[test]
    fn test_keyword_inside_select() {
        let v = validator();
        let err = v
            .validate("SELECT * FROM employees WHERE first_name = 'drop'")
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::DangerousKeyword {
                keyword: "DROP".into()
            }
        );
    }

    #[test]
    fn test_lookalike_tables() {
        let v = validator();
        for sql in [
            "SELECT * FROM employees_backup",
            "SELECT * FROM old_employees",
            "SELECT * FROM employees e JOIN salaries s ON e.employee_id = s.employee_id",
            "SELECT 1",
            // parenthesized joins and bare TABLE reads
            "SELECT * FROM employees, (secrets CROSS JOIN employees e2)",
            "SELECT * FROM employees JOIN (query_logs CROSS JOIN employees x) ON true",
            "SELECT first_name FROM employees UNION TABLE secrets",
        ] {
            assert!(
                matches!(v.validate(sql), Err(ValidationError::UnauthorizedTable { .. })),
                "{sql}"
            );
        }

        let err = v
            .validate("SELECT * FROM employees JOIN (query_logs CROSS JOIN employees x) ON true")
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnauthorizedTable {
                permitted: "employees".into(),
                tables: vec!["employees".into(), "query_logs".into()],
            }
        );
    }

    #[test]
    fn test_derived_tables_and_set_operations() {
        let v = validator();
        assert!(v.validate("SELECT * FROM (SELECT * FROM employees) e").is_ok());
        assert!(v
            .validate("SELECT first_name FROM employees UNION SELECT last_name FROM employees")
            .is_ok());
        assert!(v
            .validate("SELECT * FROM employees WHERE employee_id IN (SELECT employee_id FROM employees)")
            .is_ok());

        for sql in [
            "SELECT * FROM (SELECT * FROM secrets) s",
            "SELECT * FROM employees UNION SELECT * FROM secrets",
            "SELECT * FROM employees WHERE employee_id IN (SELECT id FROM admins)",
            "WITH s AS (SELECT * FROM secrets) SELECT * FROM employees, s",
        ] {
            assert!(
                matches!(v.validate(sql), Err(ValidationError::UnauthorizedTable { .. })),
                "{sql}"
            );
        }
    }

    #[test]
    fn test_verdict_is_idempotent() {
        let v = validator();
        for sql in [
            "SELECT * FROM employees",
            "SELECT * FROM secrets",
            "DELETE FROM employees",
            "SELECT first_name FROM employees UNION TABLE secrets",
            "",
        ] {
            let first = v.validate(sql);
            let second = v.validate(sql);
            assert_eq!(first, second, "{sql}");
        }
    }

    #[test]
    fn test_custom_table_and_empty_blacklist() {
        let policy = ValidationPolicy {
            blocked_keywords: vec![],
            ..ValidationPolicy::default().with_allowed_table("Staff")
        };
        let v = StatementValidator::new(Arc::new(policy)).unwrap();
        assert!(v.validate("SELECT * FROM staff WHERE note = 'drop'").is_ok());
        assert!(v.validate("SELECT * FROM employees").is_err());
    }
}
