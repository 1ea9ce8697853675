use serde::Serialize;
use thiserror::Error;

/// Rejections raised before any SQL reaches the database.
///
/// Covers both the shape of the natural-language input (sanitizer) and the
/// generated statement (validator). Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("Query cannot be empty")]
    EmptyInput,

    #[error("Query too long ({len} characters, max {max})")]
    TooLong { len: usize, max: usize },

    #[error("Invalid SQL syntax: {detail}")]
    SyntaxError { detail: String },

    #[error("Only SELECT queries allowed: {detail}")]
    NonSelectStatement { detail: String },

    #[error("Dangerous keyword detected: {keyword}")]
    DangerousKeyword { keyword: String },

    #[error("Only '{permitted}' table allowed (found: {})", display_tables(.tables))]
    UnauthorizedTable {
        permitted: String,
        tables: Vec<String>,
    },
}

fn display_tables(tables: &[String]) -> String {
    if tables.is_empty() {
        "none".to_string()
    } else {
        tables.join(", ")
    }
}

impl ValidationError {
    /// Stable machine code, used in logs and structured responses.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::EmptyInput => "EMPTY_INPUT",
            ValidationError::TooLong { .. } => "TOO_LONG",
            ValidationError::SyntaxError { .. } => "INVALID_SYNTAX",
            ValidationError::NonSelectStatement { .. } => "NON_SELECT",
            ValidationError::DangerousKeyword { .. } => "DANGEROUS_KEYWORD",
            ValidationError::UnauthorizedTable { .. } => "INVALID_TABLE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("SQL generator unreachable: {0}")]
    Unreachable(String),

    #[error("Query cannot be fulfilled with a SELECT statement")]
    CannotFulfill,

    #[error("SQL generation timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    #[error("SQL generation exceeded the request deadline")]
    DeadlineExceeded,

    #[error("SQL generator rate limited: {0}")]
    RateLimited(String),

    #[error("SQL generator error: {0}")]
    Api(String),
}

impl GenerationError {
    /// Transient failures are retried with backoff; everything else surfaces immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GenerationError::Timeout { .. } | GenerationError::RateLimited(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("query execution timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("database connection failed: {0}")]
    Connection(String),

    #[error("database integrity error: {0}")]
    Integrity(String),

    #[error("database error: {0}")]
    Database(String),
}

impl ExecutionError {
    /// Message safe to hand back to an end user. Raw driver text stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            ExecutionError::Timeout { timeout_ms } => format!(
                "Query execution timed out (>{}s). Try simplifying your query.",
                (*timeout_ms as f64 / 1000.0).ceil() as u64
            ),
            ExecutionError::Connection(_) => "Database connection failed. Please try again.".into(),
            ExecutionError::Integrity(_) => "Database integrity error occurred.".into(),
            ExecutionError::Database(_) => "Database error while executing the query.".into(),
        }
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ConfigError(pub String);

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("query record {0} not found")]
    NotFound(i64),

    #[error("record store error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Failure of the primary request path, tagged by the stage that produced it.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl QueryError {
    pub fn error_type(&self) -> &'static str {
        match self {
            QueryError::Validation(_) => "VALIDATION_ERROR",
            QueryError::Generation(_) => "LLM_ERROR",
            QueryError::Execution(_) => "DB_ERROR",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            QueryError::Validation(e) => e.to_string(),
            QueryError::Generation(e) => e.to_string(),
            QueryError::Execution(e) => e.user_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_type_tags() {
        let v: QueryError = ValidationError::EmptyInput.into();
        assert_eq!(v.error_type(), "VALIDATION_ERROR");

        let g: QueryError = GenerationError::CannotFulfill.into();
        assert_eq!(g.error_type(), "LLM_ERROR");

        let x: QueryError = ExecutionError::Timeout { timeout_ms: 3000 }.into();
        assert_eq!(x.error_type(), "DB_ERROR");
    }

    #[test]
    fn test_execution_user_message_hides_driver_text() {
        let e = ExecutionError::Database("relation \"secret\" does not exist".into());
        assert!(!e.user_message().contains("secret"));

        let t = ExecutionError::Timeout { timeout_ms: 3000 };
        assert!(t.user_message().contains(">3s"));
    }

    #[test]
    fn test_unauthorized_table_message() {
        let e = ValidationError::UnauthorizedTable {
            permitted: "employees".into(),
            tables: vec!["employees_backup".into()],
        };
        assert_eq!(e.kind(), "INVALID_TABLE");
        assert!(e.to_string().contains("employees_backup"));

        let none = ValidationError::UnauthorizedTable {
            permitted: "employees".into(),
            tables: vec![],
        };
        assert!(none.to_string().contains("none"));
    }

    #[test]
    fn test_transient_generation_errors() {
        assert!(GenerationError::Timeout { attempts: 1 }.is_transient());
        assert!(GenerationError::RateLimited("429".into()).is_transient());
        assert!(!GenerationError::CannotFulfill.is_transient());
        assert!(!GenerationError::Unreachable("dns".into()).is_transient());
    }
}
