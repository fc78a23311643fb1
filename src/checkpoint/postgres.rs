use super::CheckpointStore;
use crate::error::{IndexerError, Result};
use crate::models::{RunSummary, WorkflowCheckpoint};
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

/// One row per run in `indexer_checkpoints`, the checkpoint stored as JSONB
#[derive(Debug, Clone)]
pub struct PostgresCheckpointStore {
    pool: PgPool,
}

impl PostgresCheckpointStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Self::from_pool(pool).await
    }

    /// Use an existing pool, creating the table if needed
    pub async fn from_pool(pool: PgPool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS indexer_checkpoints (
                run_id UUID PRIMARY KEY,
                index_name TEXT NOT NULL,
                status TEXT NOT NULL,
                checkpoint JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        info!("Postgres checkpoint store ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CheckpointStore for PostgresCheckpointStore {
    async fn load(&self, run_id: Uuid) -> Result<Option<WorkflowCheckpoint>> {
        let row = sqlx::query("SELECT checkpoint FROM indexer_checkpoints WHERE run_id = $1")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .map(|row| row.try_get::<Json<WorkflowCheckpoint>, _>("checkpoint"))
            .transpose()?
            .map(|Json(checkpoint)| checkpoint))
    }

    async fn save(&self, checkpoint: &WorkflowCheckpoint) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO indexer_checkpoints
                (run_id, index_name, status, checkpoint, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (run_id) DO UPDATE SET
                status = EXCLUDED.status,
                checkpoint = EXCLUDED.checkpoint,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(checkpoint.run_id)
        .bind(&checkpoint.index_name)
        .bind(checkpoint.status.to_string())
        .bind(Json(checkpoint))
        .bind(checkpoint.created_at)
        .bind(checkpoint.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_document(&self, run_id: Uuid, ledger_key: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT checkpoint FROM indexer_checkpoints WHERE run_id = $1 FOR UPDATE",
        )
        .bind(run_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| IndexerError::checkpoint(format!("unknown run {run_id}")))?;

        let Json(mut checkpoint) = row.try_get::<Json<WorkflowCheckpoint>, _>("checkpoint")?;
        checkpoint.completed_documents.insert(ledger_key.to_string());
        checkpoint.touch();

        sqlx::query(
            "UPDATE indexer_checkpoints SET checkpoint = $2, updated_at = $3 WHERE run_id = $1",
        )
        .bind(run_id)
        .bind(Json(&checkpoint))
        .bind(checkpoint.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_runs(&self) -> Result<Vec<RunSummary>> {
        let rows = sqlx::query("SELECT checkpoint FROM indexer_checkpoints ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let Json(checkpoint) = row.try_get::<Json<WorkflowCheckpoint>, _>("checkpoint")?;
                Ok::<_, IndexerError>(RunSummary::from(&checkpoint))
            })
            .collect()
    }
}
