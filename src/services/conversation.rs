//! Per-task conversation context.
//!
//! A rolling summary of a taskcode's message thread, persisted as one JSON
//! document and attached as metadata to outgoing messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;

use crate::domain::errors::DomainResult;

const MAX_KEY_POINTS: usize = 10;
const MAX_NEXT_ACTIONS: usize = 10;

/// The rolling context for one taskcode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    pub taskcode: String,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub next_actions: Vec<String>,
}

fn default_status() -> String {
    "active".to_string()
}

impl ConversationContext {
    fn new(taskcode: &str) -> Self {
        Self {
            taskcode: taskcode.to_string(),
            participants: Vec::new(),
            message_count: 0,
            last_message_at: None,
            status: default_status(),
            summary: String::new(),
            key_points: Vec::new(),
            next_actions: Vec::new(),
        }
    }

    /// The metadata block attached to an outgoing message. Call after
    /// folding that message in: `message_count` is then its index.
    pub fn message_metadata(&self) -> serde_json::Value {
        let suggested: Vec<&String> =
            self.next_actions.iter().rev().take(3).rev().collect();
        serde_json::json!({
            "conversation_status": self.status,
            "participants": self.participants,
            "message_index": self.message_count,
            "summary": self.summary,
            "suggested_actions": suggested,
        })
    }
}

/// Store of conversation contexts, one JSON file per taskcode.
pub struct ConversationStore {
    context_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl ConversationStore {
    pub fn new(context_dir: impl Into<PathBuf>) -> Self {
        Self { context_dir: context_dir.into(), write_lock: Mutex::new(()) }
    }

    fn path_for(&self, taskcode: &str) -> PathBuf {
        self.context_dir.join(format!("{taskcode}_context.json"))
    }

    pub async fn load(&self, taskcode: &str) -> DomainResult<ConversationContext> {
        match tokio::fs::read_to_string(self.path_for(taskcode)).await {
            Ok(content) => Ok(serde_json::from_str(&content)
                .unwrap_or_else(|_| ConversationContext::new(taskcode))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(ConversationContext::new(taskcode))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fold a new message into the context: merge participants, bump the
    /// count, absorb summary/key_points/next_actions from the payload and
    /// truncate the lists to their last 10 entries.
    pub async fn update(
        &self,
        taskcode: &str,
        from_agent: &str,
        to_agent: &str,
        payload: &serde_json::Map<String, serde_json::Value>,
    ) -> DomainResult<ConversationContext> {
        let _guard = self.write_lock.lock().await;
        let mut ctx = self.load(taskcode).await?;

        for agent in [from_agent, to_agent] {
            if !ctx.participants.iter().any(|p| p == agent) {
                ctx.participants.push(agent.to_string());
            }
        }
        ctx.message_count += 1;
        ctx.last_message_at = Some(Utc::now());

        if let Some(summary) = payload.get("summary").and_then(serde_json::Value::as_str) {
            ctx.summary = summary.to_string();
        }
        if let Some(points) = payload.get("key_points").and_then(serde_json::Value::as_array) {
            ctx.key_points
                .extend(points.iter().filter_map(serde_json::Value::as_str).map(String::from));
        }
        if let Some(actions) = payload.get("next_actions").and_then(serde_json::Value::as_array) {
            ctx.next_actions
                .extend(actions.iter().filter_map(serde_json::Value::as_str).map(String::from));
        }
        truncate_to_last(&mut ctx.key_points, MAX_KEY_POINTS);
        truncate_to_last(&mut ctx.next_actions, MAX_NEXT_ACTIONS);

        tokio::fs::create_dir_all(&self.context_dir).await?;
        tokio::fs::write(self.path_for(taskcode), serde_json::to_string_pretty(&ctx)?).await?;
        Ok(ctx)
    }
}

fn truncate_to_last(items: &mut Vec<String>, keep: usize) {
    if items.len() > keep {
        items.drain(..items.len() - keep);
    }
}
