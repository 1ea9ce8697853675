use crate::model::{EvaluationScores, Row};
use crate::providers::Scorer;
use crate::storage::{ClaimOutcome, RecordStore};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Everything a worker needs to score one record.
#[derive(Debug, Clone)]
pub struct EvaluationJob {
    pub record_id: i64,
    pub question: String,
    pub sql: String,
    pub rows: Vec<Row>,
}

/// Where a single evaluation ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationOutcome {
    Completed,
    Failed(String),
    /// The record was missing or already claimed; nothing was written.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    QueueFull,
    Closed,
}

pub(crate) struct WorkerContext {
    pub store: Arc<dyn RecordStore>,
    pub scorer: Arc<dyn Scorer>,
    pub timeout: Duration,
}

/// Fixed set of tasks draining a bounded queue of evaluation jobs.
pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<EvaluationJob>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub(crate) fn spawn(workers: usize, capacity: usize, ctx: Arc<WorkerContext>) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let handles = (0..workers.max(1))
            .map(|worker| {
                let rx = rx.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    loop {
                        let job = rx.lock().await.recv().await;
                        let Some(job) = job else { break };
                        evaluate(&ctx, job).await;
                    }
                    tracing::debug!(event = "evaluation_worker_stopped", worker);
                })
            })
            .collect();

        Self {
            sender: Mutex::new(Some(tx)),
            handles: Mutex::new(handles),
        }
    }

    pub fn submit(&self, job: EvaluationJob) -> Result<(), SubmitError> {
        let guard = self.sender.lock().map_err(|_| SubmitError::Closed)?;
        let Some(tx) = guard.as_ref() else {
            return Err(SubmitError::Closed);
        };
        tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SubmitError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
        })
    }

    /// Stops accepting jobs and waits for queued ones to finish.
    pub async fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let handles = match self.handles.lock() {
            Ok(mut h) => std::mem::take(&mut *h),
            Err(_) => Vec::new(),
        };
        for h in handles {
            if let Err(e) = h.await {
                tracing::error!(event = "evaluation_worker_crashed", error = %e);
            }
        }
    }
}

/// pending -> evaluating -> completed | failed for one record.
pub(crate) async fn evaluate(ctx: &WorkerContext, job: EvaluationJob) -> EvaluationOutcome {
    let id = job.record_id;
    match ctx.store.claim_for_evaluation(id).await {
        Ok(ClaimOutcome::Claimed) => {}
        Ok(ClaimOutcome::NotFound) => {
            tracing::warn!(event = "evaluation_record_missing", record_id = id);
            return EvaluationOutcome::Skipped;
        }
        Ok(ClaimOutcome::AlreadyClaimed(status)) => {
            tracing::debug!(event = "evaluation_skipped", record_id = id, status = %status);
            return EvaluationOutcome::Skipped;
        }
        Err(e) => {
            tracing::error!(event = "evaluation_claim_failed", record_id = id, error = %e);
            return EvaluationOutcome::Skipped;
        }
    }

    let start = Instant::now();
    tracing::info!(
        event = "evaluation_started",
        record_id = id,
        scorer = ctx.scorer.name(),
        rows = job.rows.len(),
    );

    match run_scorer(ctx, job).await {
        Ok(scores) => finish_completed(ctx, id, &scores, start).await,
        Err(reason) => finish_failed(ctx, id, reason).await,
    }
}

/// Scoring runs in its own task so a panicking or hung scorer still ends in `failed`.
async fn run_scorer(ctx: &WorkerContext, job: EvaluationJob) -> Result<EvaluationScores, String> {
    let scorer = ctx.scorer.clone();
    let mut handle = tokio::spawn(async move {
        scorer.score(&job.question, &job.sql, &job.rows).await
    });

    match tokio::time::timeout(ctx.timeout, &mut handle).await {
        Ok(Ok(Ok(Some(scores)))) => Ok(scores),
        Ok(Ok(Ok(None))) => Err("scorer unavailable".to_string()),
        Ok(Ok(Err(e))) => Err(format!("scorer error: {e}")),
        Ok(Err(join)) => Err(format!("scoring task failed: {join}")),
        Err(_) => {
            handle.abort();
            Err(format!("scoring timed out after {}ms", ctx.timeout.as_millis()))
        }
    }
}

async fn finish_completed(
    ctx: &WorkerContext,
    id: i64,
    scores: &EvaluationScores,
    start: Instant,
) -> EvaluationOutcome {
    match ctx.store.complete_evaluation(id, scores).await {
        Ok(true) => {
            tracing::info!(
                event = "evaluation_completed",
                record_id = id,
                faithfulness = scores.faithfulness,
                answer_relevance = scores.answer_relevance,
                context_precision = scores.context_precision,
                elapsed_ms = start.elapsed().as_millis() as u64,
            );
            EvaluationOutcome::Completed
        }
        Ok(false) => {
            tracing::warn!(event = "evaluation_state_conflict", record_id = id);
            EvaluationOutcome::Skipped
        }
        Err(e) => {
            // scores could not be written; don't leave the record stuck in evaluating
            finish_failed(ctx, id, format!("failed to persist scores: {e}")).await
        }
    }
}

async fn finish_failed(ctx: &WorkerContext, id: i64, reason: String) -> EvaluationOutcome {
    tracing::warn!(event = "evaluation_failed", record_id = id, reason = %reason);
    if let Err(e) = ctx.store.fail_evaluation(id).await {
        tracing::error!(event = "evaluation_update_failed", record_id = id, error = %e);
    }
    EvaluationOutcome::Failed(reason)
}
