pub mod postgres;
pub mod schema;
pub mod seed;
pub mod store;

pub use postgres::PgRecordStore;
pub use store::SqliteStore;

use crate::model::{EvaluationScores, EvaluationStatus, NewQueryRecord, QueryRecord};
use async_trait::async_trait;

/// Result of trying to move a record from `pending` to `evaluating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    NotFound,
    /// Someone else got there first; carries the status that was found.
    AlreadyClaimed(EvaluationStatus),
}

/// Persistence seam for query records.
///
/// Status changes are compare-and-set on the current status, so a record can
/// only ever move forward through the lifecycle.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persists a new record with status `pending` and returns its id.
    async fn insert_record(&self, record: &NewQueryRecord) -> anyhow::Result<i64>;

    async fn claim_for_evaluation(&self, id: i64) -> anyhow::Result<ClaimOutcome>;

    /// Writes scores and `completed` together. Returns false if the record
    /// was not `evaluating`.
    async fn complete_evaluation(&self, id: i64, scores: &EvaluationScores)
        -> anyhow::Result<bool>;

    /// Moves an `evaluating` record to `failed`. Returns false otherwise.
    async fn fail_evaluation(&self, id: i64) -> anyhow::Result<bool>;

    async fn get_record(&self, id: i64) -> anyhow::Result<Option<QueryRecord>>;

    /// All records, newest first.
    async fn list_records(&self) -> anyhow::Result<Vec<QueryRecord>>;

    async fn ping(&self) -> anyhow::Result<()>;
}
