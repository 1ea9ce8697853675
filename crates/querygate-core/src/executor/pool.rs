//! Process-wide PostgreSQL pool.
//!
//! Initialised once at startup and torn down explicitly with [`close_pool`].
//! Components take a `PgPool` handle (or a [`QueryExecutor`](super::QueryExecutor))
//! rather than reading the global, so tests can run without it.

use crate::config::PoolConfig;
use anyhow::Context;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::OnceLock;
use std::time::Duration;

static DB_POOL: OnceLock<PgPool> = OnceLock::new();

/// Connects and installs the global pool. A second call returns the pool
/// that is already installed.
pub async fn init_pool(database_url: &str, cfg: &PoolConfig) -> anyhow::Result<PgPool> {
    if let Some(pool) = DB_POOL.get() {
        return Ok(pool.clone());
    }

    let pool = PgPoolOptions::new()
        .min_connections(cfg.size.min(cfg.max_connections()))
        .max_connections(cfg.max_connections())
        .acquire_timeout(Duration::from_millis(cfg.acquire_timeout_ms))
        .max_lifetime(Duration::from_secs(cfg.max_lifetime_secs))
        .test_before_acquire(true)
        .connect(database_url)
        .await
        .context("failed to connect to postgres")?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("postgres connectivity check failed")?;

    tracing::info!(
        event = "db_pool_initialized",
        size = cfg.size,
        max_connections = cfg.max_connections(),
    );

    // lost a race with a concurrent initialiser: keep the installed one
    if let Err(ours) = DB_POOL.set(pool) {
        ours.close().await;
    }
    DB_POOL
        .get()
        .cloned()
        .context("postgres pool not initialised")
}

/// Closes the global pool. Waits for checked-out connections to be returned.
pub async fn close_pool() {
    if let Some(pool) = DB_POOL.get() {
        if !pool.is_closed() {
            pool.close().await;
            tracing::info!(event = "db_pool_closed");
        }
    }
}
