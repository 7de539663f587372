//! Real message delivery for the ATA channel.
//!
//! Only the outbox approval path (or an admin direct send) reaches this
//! service. Every send re-validates registration, send policy, and the
//! comm-prefix rule fail-closed, then writes one JSON file per message
//! under the per-task directory and records it in the delivery tracker.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::message::{detect_priority, payload_text, AtaMessage, MessageKind, MessageStatus};
use crate::domain::models::task::Priority;
use crate::services::conversation::ConversationStore;
use crate::services::coordinator::AgentCoordinator;

/// Parameters of a send.
#[derive(Debug, Clone)]
pub struct SendMessage {
    pub taskcode: String,
    pub from_agent: String,
    pub to_agent: String,
    pub kind: MessageKind,
    pub payload: serde_json::Map<String, serde_json::Value>,
    pub prev_sha256: Option<String>,
    pub priority: Option<Priority>,
    pub requires_response: bool,
    pub context_hint: Option<String>,
}

/// Outcome of a successful send.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub msg_id: String,
    pub sha256: String,
    pub file_path: String,
    pub priority: Priority,
}

/// Tracks undelivered messages, one marker file per msg_id.
struct DeliveryTracker {
    queue_dir: PathBuf,
}

impl DeliveryTracker {
    fn path_for(&self, msg_id: &str) -> PathBuf {
        self.queue_dir.join(format!("{msg_id}.json"))
    }

    async fn enqueue(&self, message: &AtaMessage) -> DomainResult<()> {
        tokio::fs::create_dir_all(&self.queue_dir).await?;
        let record = serde_json::json!({
            "msg_id": message.msg_id,
            "message": message,
            "enqueued_at": Utc::now(),
        });
        tokio::fs::write(self.path_for(&message.msg_id), serde_json::to_string_pretty(&record)?)
            .await?;
        Ok(())
    }

    async fn dequeue(&self, msg_id: &str) -> DomainResult<bool> {
        match tokio::fs::remove_file(self.path_for(msg_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct Messenger {
    messages_dir: PathBuf,
    tracker: DeliveryTracker,
    coordinator: Arc<AgentCoordinator>,
    conversations: Arc<ConversationStore>,
}

impl Messenger {
    pub fn new(
        messages_dir: impl Into<PathBuf>,
        queue_dir: impl Into<PathBuf>,
        coordinator: Arc<AgentCoordinator>,
        conversations: Arc<ConversationStore>,
    ) -> Self {
        Self {
            messages_dir: messages_dir.into(),
            tracker: DeliveryTracker { queue_dir: queue_dir.into() },
            coordinator,
            conversations,
        }
    }

    /// Validate and deliver a message.
    ///
    /// Checks run in order, all fail-closed: both ends registered, sender
    /// send-enabled, body starts with `@{recipient_display}`.
    pub async fn send(&self, params: SendMessage) -> DomainResult<SentMessage> {
        let from = self
            .coordinator
            .get_agent(&params.from_agent)
            .await
            .ok_or_else(|| DomainError::SenderNotRegistered(params.from_agent.clone()))?;
        let to = self
            .coordinator
            .get_agent(&params.to_agent)
            .await
            .ok_or_else(|| DomainError::RecipientNotRegistered(params.to_agent.clone()))?;
        if !from.send_enabled {
            return Err(DomainError::SendDisabled(params.from_agent.clone()));
        }

        let required_prefix = format!("@{}", to.display_name());
        match payload_text(&params.payload) {
            Some(text) if text.trim_start().starts_with(&required_prefix) => {}
            _ => {
                return Err(DomainError::ValidationFailed(format!(
                    "ATA comm rule violation: message must start with '{required_prefix}'"
                )));
            }
        }

        let now = Utc::now();
        let priority = params
            .priority
            .unwrap_or_else(|| detect_priority(&params.payload));

        // conversation context is updated before sealing so the context
        // block lands inside the hashed message
        let ctx = self
            .conversations
            .update(&params.taskcode, &params.from_agent, &params.to_agent, &params.payload)
            .await?;

        let mut message = AtaMessage {
            msg_id: AtaMessage::generate_msg_id(&params.taskcode, now),
            taskcode: params.taskcode.clone(),
            task_id: None,
            from_agent: params.from_agent,
            to_agent: params.to_agent,
            created_at: now,
            kind: params.kind,
            payload: params.payload,
            prev_sha256: params.prev_sha256,
            priority,
            requires_response: params.requires_response,
            status: MessageStatus::Pending,
            context_hint: params.context_hint,
            in_reply_to: None,
            context: Some(ctx.message_metadata()),
            read_at: None,
            sha256: None,
        };
        let sha256 = message.compute_sha256();
        message.sha256 = Some(sha256.clone());

        let task_dir = self.messages_dir.join(&params.taskcode);
        tokio::fs::create_dir_all(&task_dir).await?;
        let filename = format!("msg_{}_{}.json", now.format("%Y%m%dT%H%M%S"), message.msg_id);
        let file_path = task_dir.join(&filename);
        tokio::fs::write(&file_path, serde_json::to_string_pretty(&message)?).await?;

        self.tracker.enqueue(&message).await?;

        Ok(SentMessage {
            msg_id: message.msg_id,
            sha256,
            file_path: file_path.to_string_lossy().into_owned(),
            priority,
        })
    }

    /// All messages of a taskcode, oldest first.
    pub async fn thread(&self, taskcode: &str) -> DomainResult<Vec<AtaMessage>> {
        let task_dir = self.messages_dir.join(taskcode);
        let mut messages = Vec::new();
        let mut dir = match tokio::fs::read_dir(&task_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(messages),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with("msg_") || !name.ends_with(".json") {
                continue;
            }
            let content = tokio::fs::read_to_string(entry.path()).await?;
            if let Ok(message) = serde_json::from_str::<AtaMessage>(&content) {
                messages.push(message);
            }
        }
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    /// Unread messages addressed to an agent, oldest first.
    pub async fn unread_for(&self, to_agent: &str) -> DomainResult<Vec<AtaMessage>> {
        let mut unread = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.messages_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(unread),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let taskcode = entry.file_name().to_string_lossy().into_owned();
            for message in self.thread(&taskcode).await? {
                if message.to_agent == to_agent
                    && !matches!(message.status, MessageStatus::Read | MessageStatus::Acked)
                {
                    unread.push(message);
                }
            }
        }
        unread.sort_by_key(|m| m.created_at);
        Ok(unread)
    }

    /// Mark a message read or acked (receiver side). Removes it from the
    /// delivery tracker. Returns false when the msg_id is unknown.
    pub async fn mark(&self, msg_id: &str, status: MessageStatus) -> DomainResult<bool> {
        let mut dir = match tokio::fs::read_dir(&self.messages_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let mut task_dir = tokio::fs::read_dir(entry.path()).await?;
            while let Some(file) = task_dir.next_entry().await? {
                let name = file.file_name().to_string_lossy().into_owned();
                if !name.contains(msg_id) {
                    continue;
                }
                let content = tokio::fs::read_to_string(file.path()).await?;
                let Ok(mut message) = serde_json::from_str::<AtaMessage>(&content) else {
                    continue;
                };
                if message.msg_id != msg_id {
                    continue;
                }
                message.status = status;
                if status == MessageStatus::Read {
                    message.read_at = Some(Utc::now());
                }
                tokio::fs::write(file.path(), serde_json::to_string_pretty(&message)?).await?;
                self.tracker.dequeue(msg_id).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }
}
