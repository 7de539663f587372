//! SQLite storage for task-id sequence counters and the taskcode mapping.

use sqlx::SqlitePool;
use chrono::Utc;

use crate::domain::errors::{DomainError, DomainResult};

#[derive(Clone)]
pub struct SqliteIdRepository {
    pool: SqlitePool,
}

impl SqliteIdRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Atomically advance and return the per-date sequence counter.
    /// Starts at 1 for an unseen date.
    pub async fn next_seq(&self, date: &str) -> DomainResult<u32> {
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO task_seq (date, seq) VALUES (?, 1)
             ON CONFLICT(date) DO UPDATE SET seq = seq + 1
             RETURNING seq",
        )
        .bind(date)
        .fetch_one(&self.pool)
        .await?;
        u32::try_from(row.0).map_err(|_| DomainError::Database("sequence overflow".to_string()))
    }

    /// Register a taskcode ↔ task_id pair. Re-registering the identical
    /// pair refreshes `updated_at`; binding either side to a different
    /// partner is a conflict.
    pub async fn register_mapping(&self, taskcode: &str, task_id: &str) -> DomainResult<()> {
        if let Some(existing) = self.get_task_id(taskcode).await? {
            if existing != task_id {
                return Err(DomainError::MappingConflict {
                    taskcode: taskcode.to_string(),
                    task_id: task_id.to_string(),
                });
            }
        }
        if let Some(existing) = self.get_taskcode(task_id).await? {
            if existing != taskcode {
                return Err(DomainError::MappingConflict {
                    taskcode: taskcode.to_string(),
                    task_id: task_id.to_string(),
                });
            }
        }

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO task_id_mapping (taskcode, task_id, created_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(taskcode) DO UPDATE SET task_id = excluded.task_id, updated_at = excluded.updated_at",
        )
        .bind(taskcode)
        .bind(task_id)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_task_id(&self, taskcode: &str) -> DomainResult<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT task_id FROM task_id_mapping WHERE taskcode = ?")
                .bind(taskcode)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id,)| id))
    }

    pub async fn get_taskcode(&self, task_id: &str) -> DomainResult<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT taskcode FROM task_id_mapping WHERE task_id = ?")
                .bind(task_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(code,)| code))
    }
}

/// Idempotency records for the ingress bridge, plus the external↔internal
/// task-id map. Shares the pool with the queue so replay survives restarts.
#[derive(Clone)]
pub struct SqliteBridgeDedupe {
    pool: SqlitePool,
}

impl SqliteBridgeDedupe {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record the result for `(request_id, task_id)`. Returns the previously
    /// recorded result when the pair was seen before.
    pub async fn record_or_get(
        &self,
        request_id: &str,
        task_id: &str,
        result: &serde_json::Value,
    ) -> DomainResult<Option<serde_json::Value>> {
        if let Some(prev) = self.get(request_id, task_id).await? {
            return Ok(Some(prev));
        }
        sqlx::query(
            "INSERT OR IGNORE INTO bridge_dedupe (request_id, task_id, result, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(request_id)
        .bind(task_id)
        .bind(serde_json::to_string(result)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(None)
    }

    pub async fn get(
        &self,
        request_id: &str,
        task_id: &str,
    ) -> DomainResult<Option<serde_json::Value>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT result FROM bridge_dedupe WHERE request_id = ? AND task_id = ?",
        )
        .bind(request_id)
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|(r,)| serde_json::from_str(&r).map_err(Into::into)).transpose()
    }

    pub async fn count(&self, request_id: &str, task_id: &str) -> DomainResult<u32> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM bridge_dedupe WHERE request_id = ? AND task_id = ?",
        )
        .bind(request_id)
        .bind(task_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(u32::try_from(row.0).unwrap_or(0))
    }

    pub async fn map_external_task_id(&self, external: &str, task_id: &str) -> DomainResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO bridge_task_id_map (external_task_id, task_id, created_at)
             VALUES (?, ?, ?)",
        )
        .bind(external)
        .bind(task_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn lookup_internal(&self, external: &str) -> DomainResult<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT task_id FROM bridge_task_id_map WHERE external_task_id = ?")
                .bind(external)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id,)| id))
    }

    pub async fn lookup_external(&self, task_id: &str) -> DomainResult<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT external_task_id FROM bridge_task_id_map WHERE task_id = ?")
                .bind(task_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id,)| id))
    }
}
