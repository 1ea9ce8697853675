use serde::{Deserialize, Serialize};

pub const DEFAULT_ALLOWED_TABLE: &str = "employees";
pub const DEFAULT_MAX_INPUT_CHARS: usize = 500;
pub const DEFAULT_MAX_RESULT_ROWS: usize = 1000;

pub const DEFAULT_BLOCKED_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "drop", "alter", "create", "truncate", "exec", "execute",
];

/// Static allowlist consumed by the sanitizer, validator and executor.
///
/// Only read-only `SELECT` statements are ever permitted; that part is not
/// configurable. Built once at startup and shared behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationPolicy {
    /// Exact (case-insensitive) name of the single queryable table.
    pub allowed_table: String,
    pub blocked_keywords: Vec<String>,
    pub max_input_chars: usize,
    pub max_result_rows: usize,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            allowed_table: DEFAULT_ALLOWED_TABLE.to_string(),
            blocked_keywords: DEFAULT_BLOCKED_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            max_result_rows: DEFAULT_MAX_RESULT_ROWS,
        }
    }
}

impl ValidationPolicy {
    pub fn with_allowed_table(mut self, table: impl Into<String>) -> Self {
        self.allowed_table = table.into();
        self
    }

    pub fn normalized_table(&self) -> String {
        self.allowed_table.trim().to_lowercase()
    }
}
