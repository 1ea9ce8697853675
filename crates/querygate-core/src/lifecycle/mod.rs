//! Query records and their asynchronous evaluation.
//!
//! A record is written synchronously as `pending` when a query has executed.
//! Scoring happens later on a worker pool; each record moves
//! `pending -> evaluating -> completed | failed` exactly once.

pub mod worker;

pub use worker::{EvaluationJob, EvaluationOutcome, SubmitError, WorkerPool};

use crate::config::EvaluationConfig;
use crate::errors::LifecycleError;
use crate::model::{EvaluationScores, EvaluationStatus, NewQueryRecord};
use crate::providers::Scorer;
use crate::storage::RecordStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use worker::WorkerContext;

/// Answer to a status lookup. `scores` is only set once `completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationStatusView {
    pub query_log_id: i64,
    pub status: EvaluationStatus,
    pub scores: Option<EvaluationScores>,
}

pub struct EvaluationManager {
    store: Arc<dyn RecordStore>,
    workers: WorkerPool,
}

impl EvaluationManager {
    /// Spawns the worker pool; must be called inside a tokio runtime.
    pub fn start(
        store: Arc<dyn RecordStore>,
        scorer: Arc<dyn Scorer>,
        cfg: &EvaluationConfig,
    ) -> Self {
        let ctx = Arc::new(WorkerContext {
            store: store.clone(),
            scorer,
            timeout: Duration::from_millis(cfg.timeout_ms),
        });
        let workers = WorkerPool::spawn(cfg.workers, cfg.queue_capacity, ctx);
        tracing::info!(
            event = "evaluation_workers_started",
            workers = cfg.workers,
            queue_capacity = cfg.queue_capacity,
        );
        Self { store, workers }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Persists a new `pending` record. Storage failures are logged and
    /// reported as `None`; they never fail the caller's request.
    pub async fn create(&self, record: &NewQueryRecord) -> Option<i64> {
        match self.store.insert_record(record).await {
            Ok(id) => {
                tracing::info!(
                    event = "query_logged",
                    record_id = id,
                    result_count = record.result_count,
                    execution_time_ms = record.execution_time_ms,
                );
                Some(id)
            }
            Err(e) => {
                tracing::error!(event = "query_logging_failed", error = %e);
                None
            }
        }
    }

    /// Queues a record for scoring. Returns true if a job was enqueued.
    ///
    /// Records already past `pending` are left alone, so a retried request
    /// cannot schedule a second evaluation.
    pub async fn schedule_evaluation(&self, job: EvaluationJob) -> bool {
        let id = job.record_id;
        match self.store.get_record(id).await {
            Ok(Some(rec)) if rec.status == EvaluationStatus::Pending => {}
            Ok(Some(rec)) => {
                tracing::debug!(event = "evaluation_already_scheduled", record_id = id, status = %rec.status);
                return false;
            }
            Ok(None) => {
                tracing::warn!(event = "evaluation_record_missing", record_id = id);
                return false;
            }
            Err(e) => {
                tracing::error!(event = "evaluation_schedule_failed", record_id = id, error = %e);
                return false;
            }
        }

        match self.workers.submit(job) {
            Ok(()) => {
                tracing::debug!(event = "evaluation_scheduled", record_id = id);
                true
            }
            Err(SubmitError::QueueFull) => {
                // stays pending; visible as such in status lookups and reports
                tracing::warn!(event = "evaluation_queue_full", record_id = id);
                false
            }
            Err(SubmitError::Closed) => {
                tracing::warn!(event = "evaluation_queue_closed", record_id = id);
                false
            }
        }
    }

    pub async fn get_status(&self, id: i64) -> Result<EvaluationStatusView, LifecycleError> {
        let rec = self
            .store
            .get_record(id)
            .await?
            .ok_or(LifecycleError::NotFound(id))?;
        let scores = match rec.status {
            EvaluationStatus::Completed => rec.scores,
            _ => None,
        };
        Ok(EvaluationStatusView {
            query_log_id: rec.id,
            status: rec.status,
            scores,
        })
    }

    /// Drains queued evaluations and stops the workers.
    pub async fn shutdown(&self) {
        self.workers.shutdown().await;
        tracing::info!(event = "evaluation_workers_stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Row;
    use crate::storage::SqliteStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behaviour {
        Scores(EvaluationScores),
        Unavailable,
        Error,
        Panic,
        Hang,
    }

    struct StubScorer {
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl StubScorer {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Scorer for StubScorer {
        async fn score(
            &self,
            _question: &str,
            _sql: &str,
            _rows: &[Row],
        ) -> anyhow::Result<Option<EvaluationScores>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behaviour {
                Behaviour::Scores(s) => Ok(Some(*s)),
                Behaviour::Unavailable => Ok(None),
                Behaviour::Error => anyhow::bail!("judge exploded"),
                Behaviour::Panic => panic!("scorer bug"),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(None)
                }
            }
        }

        fn name(&self) -> &'static str {
            "stub"
        }
    }

    fn store() -> Arc<dyn RecordStore> {
        let s = SqliteStore::memory().unwrap();
        s.init_schema().unwrap();
        Arc::new(s)
    }

    fn new_record() -> NewQueryRecord {
        NewQueryRecord {
            question: "who works in sales".into(),
            generated_sql: "SELECT * FROM employees WHERE department = 'Sales'".into(),
            result_count: 3,
            execution_time_ms: 12,
        }
    }

    fn job(id: i64) -> EvaluationJob {
        EvaluationJob {
            record_id: id,
            question: "who works in sales".into(),
            sql: "SELECT * FROM employees WHERE department = 'Sales'".into(),
            rows: Vec::new(),
        }
    }

    fn ctx(store: Arc<dyn RecordStore>, scorer: Arc<dyn Scorer>, timeout_ms: u64) -> WorkerContext {
        WorkerContext {
            store,
            scorer,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[tokio::test]
    async fn test_successful_evaluation_round_trip() -> anyhow::Result<()> {
        let store = store();
        let scores = EvaluationScores::new(0.91, 0.82, 0.73);
        let manager = EvaluationManager::start(
            store.clone(),
            StubScorer::new(Behaviour::Scores(scores)),
            &EvaluationConfig::default(),
        );

        let id = manager.create(&new_record()).await.unwrap();
        let view = manager.get_status(id).await?;
        assert_eq!(view.status, EvaluationStatus::Pending);
        assert_eq!(view.scores, None);

        assert!(manager.schedule_evaluation(job(id)).await);
        manager.shutdown().await;

        let view = manager.get_status(id).await?;
        assert_eq!(view.status, EvaluationStatus::Completed);
        assert_eq!(view.scores, Some(scores));
        Ok(())
    }

    #[tokio::test]
    async fn test_failures_end_in_failed_without_scores() -> anyhow::Result<()> {
        for behaviour in [Behaviour::Unavailable, Behaviour::Error, Behaviour::Panic] {
            let store = store();
            let id = store.insert_record(&new_record()).await?;
            let c = ctx(store.clone(), StubScorer::new(behaviour), 1_000);

            assert!(matches!(
                worker::evaluate(&c, job(id)).await,
                EvaluationOutcome::Failed(_)
            ));
            let rec = store.get_record(id).await?.unwrap();
            assert_eq!(rec.status, EvaluationStatus::Failed);
            assert_eq!(rec.scores, None);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_hung_scorer_times_out() -> anyhow::Result<()> {
        let store = store();
        let id = store.insert_record(&new_record()).await?;
        let c = ctx(store.clone(), StubScorer::new(Behaviour::Hang), 50);

        let outcome = worker::evaluate(&c, job(id)).await;
        assert!(matches!(outcome, EvaluationOutcome::Failed(ref r) if r.contains("timed out")));
        assert_eq!(
            store.get_record(id).await?.unwrap().status,
            EvaluationStatus::Failed
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_second_evaluation_is_skipped() -> anyhow::Result<()> {
        let store = store();
        let id = store.insert_record(&new_record()).await?;
        let scorer = StubScorer::new(Behaviour::Scores(EvaluationScores::new(1.0, 1.0, 1.0)));
        let c = ctx(store.clone(), scorer.clone(), 1_000);

        assert_eq!(worker::evaluate(&c, job(id)).await, EvaluationOutcome::Completed);
        assert_eq!(worker::evaluate(&c, job(id)).await, EvaluationOutcome::Skipped);
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_record_is_skipped() {
        let c = ctx(store(), StubScorer::new(Behaviour::Unavailable), 1_000);
        assert_eq!(worker::evaluate(&c, job(4242)).await, EvaluationOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_schedule_is_noop_past_pending() -> anyhow::Result<()> {
        let store = store();
        let scorer = StubScorer::new(Behaviour::Scores(EvaluationScores::new(0.9, 0.9, 0.9)));
        let manager = EvaluationManager::start(store.clone(), scorer.clone(), &EvaluationConfig::default());

        let id = manager.create(&new_record()).await.unwrap();
        store.claim_for_evaluation(id).await?;
        assert!(!manager.schedule_evaluation(job(id)).await);
        assert!(!manager.schedule_evaluation(job(9_999)).await);

        manager.shutdown().await;
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_unscheduled_record_stays_pending() -> anyhow::Result<()> {
        let store = store();
        let manager = EvaluationManager::start(
            store.clone(),
            StubScorer::new(Behaviour::Unavailable),
            &EvaluationConfig::default(),
        );
        let id = manager.create(&new_record()).await.unwrap();
        manager.shutdown().await;

        let view = manager.get_status(id).await?;
        assert_eq!(view.status, EvaluationStatus::Pending);
        assert!(view.scores.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let manager = EvaluationManager::start(
            store(),
            StubScorer::new(Behaviour::Unavailable),
            &EvaluationConfig::default(),
        );
        assert!(matches!(
            manager.get_status(77).await,
            Err(LifecycleError::NotFound(77))
        ));
    }

    #[tokio::test]
    async fn test_scheduling_after_shutdown_is_rejected() -> anyhow::Result<()> {
        let store = store();
        let manager = EvaluationManager::start(
            store.clone(),
            StubScorer::new(Behaviour::Unavailable),
            &EvaluationConfig::default(),
        );
        let id = manager.create(&new_record()).await.unwrap();
        manager.shutdown().await;
        assert!(!manager.schedule_evaluation(job(id)).await);
        Ok(())
    }
}
