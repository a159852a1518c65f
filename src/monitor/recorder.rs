//! Append-only sinks for check results.
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

use super::service::CheckResult;

const INSERT_LOG_QUERY: &str = "INSERT INTO sla.log (service_id, status, time) VALUES ($1, $2, $3)";

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

#[async_trait]
pub trait ResultRecorder: Send + Sync {
    async fn record(&self, result: &CheckResult) -> Result<(), RecorderError>;
}

/// Appends results to the `sla.log` warehouse table.
pub struct WarehouseRecorder {
    pool: PgPool,
}

impl WarehouseRecorder {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultRecorder for WarehouseRecorder {
    async fn record(&self, result: &CheckResult) -> Result<(), RecorderError> {
        sqlx::query(INSERT_LOG_QUERY)
            .bind(result.service_id)
            .bind(result.status)
            .bind(result.timestamp)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Standalone variant: results only go to the log.
#[derive(Debug, Default)]
pub struct LogRecorder;

#[async_trait]
impl ResultRecorder for LogRecorder {
    async fn record(&self, result: &CheckResult) -> Result<(), RecorderError> {
        info!(
            service_id = result.service_id,
            status = result.status,
            time = %result.timestamp.to_rfc3339(),
            "Check result."
        );
        Ok(())
    }
}
