//! Port for the durable message queue.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::queue::{DlqMessage, QueueMessage};

/// Durable queue with per-message dedupe, retry with backoff, and a DLQ.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Enqueue a message. Returns `false` (not an error) when the
    /// message_id was seen before.
    async fn enqueue(
        &self,
        message_id: &str,
        task_id: Option<&str>,
        to_agent: &str,
        payload: &serde_json::Value,
    ) -> DomainResult<bool>;

    /// Messages ready for delivery: PENDING, or NACKED past their backoff
    /// window, ordered by creation time. `lane` filters by `to_agent`.
    async fn get_pending_messages(
        &self,
        limit: i64,
        lane: Option<&str>,
    ) -> DomainResult<Vec<QueueMessage>>;

    async fn mark_sent(&self, message_id: &str) -> DomainResult<()>;

    async fn mark_acked(&self, message_id: &str) -> DomainResult<()>;

    /// Record a delivery failure. Moves the message to the DLQ once the
    /// retry budget is exhausted.
    async fn mark_nacked(&self, message_id: &str, error: Option<&str>) -> DomainResult<()>;

    async fn get_dlq_messages(&self, limit: i64) -> DomainResult<Vec<DlqMessage>>;

    /// Re-enqueue a dead-lettered message. Returns `false` when the message
    /// is unknown or dedupe rejects the replay.
    async fn replay_dlq_message(&self, message_id: &str) -> DomainResult<bool>;
}
