pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS query_logs (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  natural_language_query TEXT NOT NULL,
  generated_sql TEXT NOT NULL,
  evaluation_status TEXT NOT NULL DEFAULT 'pending',
  faithfulness_score REAL,
  answer_relevance_score REAL,
  context_precision_score REAL,
  result_count INTEGER,
  execution_time_ms INTEGER,
  created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_query_logs_created_at ON query_logs(created_at);
"#;

/// Applied after column migrations, since older databases lack the status column.
pub const POST_MIGRATION_DDL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_query_logs_status ON query_logs(evaluation_status);
"#;

/// PostgreSQL statements, executed one at a time.
pub const PG_DDL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS query_logs (
      id BIGSERIAL PRIMARY KEY,
      natural_language_query TEXT NOT NULL,
      generated_sql TEXT NOT NULL,
      evaluation_status VARCHAR(20) NOT NULL DEFAULT 'pending',
      faithfulness_score DOUBLE PRECISION,
      answer_relevance_score DOUBLE PRECISION,
      context_precision_score DOUBLE PRECISION,
      result_count BIGINT,
      execution_time_ms BIGINT,
      created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "ALTER TABLE query_logs ADD COLUMN IF NOT EXISTS evaluation_status VARCHAR(20) NOT NULL DEFAULT 'pending'",
    "ALTER TABLE query_logs ADD COLUMN IF NOT EXISTS faithfulness_score DOUBLE PRECISION",
    "ALTER TABLE query_logs ADD COLUMN IF NOT EXISTS answer_relevance_score DOUBLE PRECISION",
    "ALTER TABLE query_logs ADD COLUMN IF NOT EXISTS context_precision_score DOUBLE PRECISION",
    "CREATE INDEX IF NOT EXISTS idx_query_logs_created_at ON query_logs(created_at)",
    "CREATE INDEX IF NOT EXISTS idx_query_logs_status ON query_logs(evaluation_status)",
];
