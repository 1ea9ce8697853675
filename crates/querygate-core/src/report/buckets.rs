use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// SQL shape used to group records in the analysis report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Join,
    Aggregation,
    DateRange,
    WhereFilter,
    #[serde(rename = "simple_select")]
    Simple,
}

impl Bucket {
    pub const ALL: [Bucket; 5] = [
        Bucket::Join,
        Bucket::Aggregation,
        Bucket::DateRange,
        Bucket::WhereFilter,
        Bucket::Simple,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Join => "join",
            Bucket::Aggregation => "aggregation",
            Bucket::DateRange => "date_range",
            Bucket::WhereFilter => "where_filter",
            Bucket::Simple => "simple_select",
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Checked in order; the first match wins.
const RULES: &[(Bucket, &str)] = &[
    (Bucket::Join, r"(?i)\bJOIN\b"),
    (
        Bucket::Aggregation,
        r"(?i)\bDISTINCT\b|\bGROUP\s+BY\b|\b(?:COUNT|SUM|AVG|MAX|MIN)\s*\(",
    ),
    (
        Bucket::DateRange,
        r"(?i)\bINTERVAL\b|\bDATE_SUB\b|\bDATE_ADD\b|\bDATE\s*\(",
    ),
    (Bucket::WhereFilter, r"(?i)\bWHERE\b"),
];

fn compiled_rules() -> &'static [(Bucket, Regex)] {
    static COMPILED: OnceLock<Vec<(Bucket, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .filter_map(|(bucket, pattern)| match Regex::new(pattern) {
                Ok(re) => Some((*bucket, re)),
                Err(e) => {
                    tracing::error!(event = "bucket_rule_invalid", bucket = %bucket, error = %e);
                    None
                }
            })
            .collect()
    })
}

pub fn classify(sql: &str) -> Bucket {
    compiled_rules()
        .iter()
        .find(|(_, re)| re.is_match(sql))
        .map(|(bucket, _)| *bucket)
        .unwrap_or(Bucket::Simple)
}
