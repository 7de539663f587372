//! SQLite implementation of the durable message queue.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::queue::{DlqMessage, QueueMessage, QueueMessageStatus};
use crate::domain::ports::MessageQueue;

/// Retry schedule applied on NACK.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retry_delays_secs: Vec<i64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 3, retry_delays_secs: vec![1, 2, 4] }
    }
}

impl RetryConfig {
    /// Delay before the next attempt after `retry_count` prior failures.
    fn delay_for(&self, retry_count: u32) -> Duration {
        let idx = (retry_count as usize).min(self.retry_delays_secs.len().saturating_sub(1));
        Duration::seconds(*self.retry_delays_secs.get(idx).unwrap_or(&1))
    }
}

#[derive(Clone)]
pub struct SqliteMessageQueue {
    pool: SqlitePool,
    retry: RetryConfig,
}

impl SqliteMessageQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, retry: RetryConfig::default() }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn move_to_dlq(
        &self,
        message_id: &str,
        error: Option<&str>,
        retry_count: u32,
    ) -> DomainResult<()> {
        let row: Option<(Option<String>, String, String)> =
            sqlx::query_as("SELECT task_id, to_agent, payload FROM messages WHERE message_id = ?")
                .bind(message_id)
                .fetch_optional(&self.pool)
                .await?;
        let Some((task_id, to_agent, payload)) = row else {
            return Ok(());
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT OR REPLACE INTO dlq
             (message_id, task_id, to_agent, payload, failed_at, error_message, retry_count)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(message_id)
        .bind(&task_id)
        .bind(&to_agent)
        .bind(&payload)
        .bind(Utc::now().to_rfc3339())
        .bind(error)
        .bind(i64::from(retry_count))
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE messages SET status = 'dlq' WHERE message_id = ?")
            .bind(message_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl MessageQueue for SqliteMessageQueue {
    async fn enqueue(
        &self,
        message_id: &str,
        task_id: Option<&str>,
        to_agent: &str,
        payload: &serde_json::Value,
    ) -> DomainResult<bool> {
        let now = Utc::now().to_rfc3339();
        let payload_json = serde_json::to_string(payload)?;

        // The dedupe row and the message row land in one transaction; a
        // primary-key violation on either means the id was seen before.
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO message_dedupe (message_id, created_at) VALUES (?, ?)",
        )
        .bind(message_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO messages (message_id, task_id, to_agent, payload, status, created_at)
             VALUES (?, ?, ?, ?, 'pending', ?)",
        )
        .bind(message_id)
        .bind(task_id)
        .bind(to_agent)
        .bind(&payload_json)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn get_pending_messages(
        &self,
        limit: i64,
        lane: Option<&str>,
    ) -> DomainResult<Vec<QueueMessage>> {
        let now = Utc::now().to_rfc3339();
        let rows: Vec<QueueMessageRow> = if let Some(lane) = lane {
            sqlx::query_as(
                "SELECT * FROM messages
                 WHERE to_agent = ? AND (status = 'pending' OR (status = 'nacked' AND next_retry_at <= ?))
                 ORDER BY created_at ASC
                 LIMIT ?",
            )
            .bind(lane)
            .bind(&now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as(
                "SELECT * FROM messages
                 WHERE status = 'pending' OR (status = 'nacked' AND next_retry_at <= ?)
                 ORDER BY created_at ASC
                 LIMIT ?",
            )
            .bind(&now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn mark_sent(&self, message_id: &str) -> DomainResult<()> {
        sqlx::query("UPDATE messages SET status = 'sent', sent_at = ? WHERE message_id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(message_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_acked(&self, message_id: &str) -> DomainResult<()> {
        sqlx::query("UPDATE messages SET status = 'acked', acked_at = ? WHERE message_id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(message_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_nacked(&self, message_id: &str, error: Option<&str>) -> DomainResult<()> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT retry_count FROM messages WHERE message_id = ?")
                .bind(message_id)
                .fetch_optional(&self.pool)
                .await?;
        let retry_count = u32::try_from(row.map_or(0, |(c,)| c)).unwrap_or(0);

        if retry_count >= self.retry.max_retries {
            return self.move_to_dlq(message_id, error, retry_count).await;
        }

        let next_retry_at: DateTime<Utc> = Utc::now() + self.retry.delay_for(retry_count);
        sqlx::query(
            "UPDATE messages
             SET status = 'nacked', retry_count = ?, next_retry_at = ?, error_message = ?
             WHERE message_id = ?",
        )
        .bind(i64::from(retry_count + 1))
        .bind(next_retry_at.to_rfc3339())
        .bind(error)
        .bind(message_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_dlq_messages(&self, limit: i64) -> DomainResult<Vec<DlqMessage>> {
        let rows: Vec<DlqRow> =
            sqlx::query_as("SELECT * FROM dlq ORDER BY failed_at DESC LIMIT ?")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn replay_dlq_message(&self, message_id: &str) -> DomainResult<bool> {
        let row: Option<(Option<String>, String, String)> =
            sqlx::query_as("SELECT task_id, to_agent, payload FROM dlq WHERE message_id = ?")
                .bind(message_id)
                .fetch_optional(&self.pool)
                .await?;
        let Some((task_id, to_agent, payload)) = row else {
            return Ok(false);
        };
        let payload: serde_json::Value = serde_json::from_str(&payload)?;

        // The original enqueue left rows behind in messages/dedupe; clear
        // them so the replay can pass dedupe and start a fresh attempt.
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM messages WHERE message_id = ?")
            .bind(message_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM message_dedupe WHERE message_id = ?")
            .bind(message_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let enqueued = self.enqueue(message_id, task_id.as_deref(), &to_agent, &payload).await?;
        if enqueued {
            sqlx::query("DELETE FROM dlq WHERE message_id = ?")
                .bind(message_id)
                .execute(&self.pool)
                .await?;
        }
        Ok(enqueued)
    }
}

#[derive(FromRow)]
struct QueueMessageRow {
    message_id: String,
    task_id: Option<String>,
    to_agent: String,
    payload: String,
    status: String,
    retry_count: i64,
    created_at: String,
    sent_at: Option<String>,
    acked_at: Option<String>,
    next_retry_at: Option<String>,
    error_message: Option<String>,
}

fn parse_ts(s: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DomainError::Database(format!("bad timestamp {s}: {e}")))
}

impl TryFrom<QueueMessageRow> for QueueMessage {
    type Error = DomainError;

    fn try_from(row: QueueMessageRow) -> Result<Self, Self::Error> {
        Ok(QueueMessage {
            message_id: row.message_id,
            task_id: row.task_id,
            to_agent: row.to_agent,
            payload: serde_json::from_str(&row.payload)?,
            status: QueueMessageStatus::from_str(&row.status)
                .ok_or_else(|| DomainError::Database(format!("bad status: {}", row.status)))?,
            retry_count: u32::try_from(row.retry_count).unwrap_or(0),
            created_at: parse_ts(&row.created_at)?,
            sent_at: row.sent_at.as_deref().map(parse_ts).transpose()?,
            acked_at: row.acked_at.as_deref().map(parse_ts).transpose()?,
            next_retry_at: row.next_retry_at.as_deref().map(parse_ts).transpose()?,
            error_message: row.error_message,
        })
    }
}

#[derive(FromRow)]
struct DlqRow {
    message_id: String,
    task_id: Option<String>,
    to_agent: String,
    payload: String,
    failed_at: String,
    error_message: Option<String>,
    retry_count: i64,
}

impl TryFrom<DlqRow> for DlqMessage {
    type Error = DomainError;

    fn try_from(row: DlqRow) -> Result<Self, Self::Error> {
        Ok(DlqMessage {
            message_id: row.message_id,
            task_id: row.task_id,
            to_agent: row.to_agent,
            payload: serde_json::from_str(&row.payload)?,
            failed_at: parse_ts(&row.failed_at)?,
            error_message: row.error_message,
            retry_count: u32::try_from(row.retry_count).unwrap_or(0),
        })
    }
}
