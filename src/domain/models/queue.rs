//! Durable queue message rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of a queued message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueMessageStatus {
    Pending,
    Sent,
    Acked,
    Nacked,
    Failed,
    Dlq,
}

impl QueueMessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Acked => "acked",
            Self::Nacked => "nacked",
            Self::Failed => "failed",
            Self::Dlq => "dlq",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "acked" => Some(Self::Acked),
            "nacked" => Some(Self::Nacked),
            "failed" => Some(Self::Failed),
            "dlq" => Some(Self::Dlq),
            _ => None,
        }
    }
}

/// One row of the durable message queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub message_id: String,
    pub task_id: Option<String>,
    /// Delivery lane: a subscriber name (board, orchestrator, aws_bridge)
    /// or an agent id.
    pub to_agent: String,
    pub payload: serde_json::Value,
    pub status: QueueMessageStatus,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub acked_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// A dead-lettered message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqMessage {
    pub message_id: String,
    pub task_id: Option<String>,
    pub to_agent: String,
    pub payload: serde_json::Value,
    pub failed_at: DateTime<Utc>,
    pub error_message: Option<String>,
    pub retry_count: u32,
}
