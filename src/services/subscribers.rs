//! Lane subscribers: long-running consumers of the fan-out queue.
//!
//! Each subscriber drains its own lane with a bounded poll interval,
//! applies side effects, and acks on success or nacks with the error.
//! Handlers are idempotent per event_id: applying the same event twice
//! must not compound side effects.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::event::{Event, EventType};
use crate::domain::models::task::{Task, TaskStatus};
use crate::domain::models::task_id::{TaskCode, TaskId};
use crate::domain::ports::MessageQueue;
use crate::services::board::BoardWriter;
use crate::services::bridge::IngressBridge;
use crate::services::orchestrator::TaskOrchestrator;
use crate::services::task_id::TaskIdManager;

/// A handler for one lane's events.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// The lane this subscriber drains (`to_agent` in the queue).
    fn lane(&self) -> &'static str;

    /// Apply one event. An `Err` nacks the message for retry.
    async fn handle_event(&self, event: &Event) -> DomainResult<()>;
}

/// Drain one batch for a subscriber. Returns the number of acked messages.
pub async fn drain_once(
    queue: &dyn MessageQueue,
    subscriber: &dyn EventSubscriber,
    limit: i64,
) -> DomainResult<usize> {
    let messages = queue.get_pending_messages(limit, Some(subscriber.lane())).await?;
    let mut processed = 0;
    for message in messages {
        let event = message
            .payload
            .get("event_data")
            .cloned()
            .ok_or_else(|| DomainError::ValidationFailed("missing event_data".to_string()))
            .and_then(|v| serde_json::from_value::<Event>(v).map_err(Into::into));

        match event {
            Ok(event) => match subscriber.handle_event(&event).await {
                Ok(()) => {
                    queue.mark_acked(&message.message_id).await?;
                    processed += 1;
                }
                Err(e) => {
                    queue.mark_nacked(&message.message_id, Some(&e.to_string())).await?;
                }
            },
            Err(e) => {
                queue.mark_nacked(&message.message_id, Some(&e.to_string())).await?;
            }
        }
    }
    Ok(processed)
}

/// Run a subscriber loop until the shutdown signal flips. Drains one final
/// batch before exiting.
pub async fn run_subscriber_loop(
    queue: Arc<dyn MessageQueue>,
    subscriber: Arc<dyn EventSubscriber>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let lane = subscriber.lane();
    tracing::info!(lane, "subscriber loop started");
    loop {
        if *shutdown.borrow() {
            break;
        }
        match drain_once(queue.as_ref(), subscriber.as_ref(), 10).await {
            Ok(n) if n > 0 => tracing::debug!(lane, processed = n, "drained batch"),
            Ok(_) => {}
            Err(e) => tracing::warn!(lane, error = %e, "subscriber batch failed"),
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = shutdown.changed() => {}
        }
    }
    if let Err(e) = drain_once(queue.as_ref(), subscriber.as_ref(), 10).await {
        tracing::warn!(lane, error = %e, "final drain failed");
    }
    tracing::info!(lane, "subscriber loop stopped");
}

// ---- board lane ----

pub struct BoardSubscriber {
    board: Arc<BoardWriter>,
    task_ids: TaskIdManager,
}

impl BoardSubscriber {
    pub fn new(board: Arc<BoardWriter>, task_ids: TaskIdManager) -> Self {
        Self { board, task_ids }
    }
}

#[async_trait]
impl EventSubscriber for BoardSubscriber {
    fn lane(&self) -> &'static str {
        "board"
    }

    async fn handle_event(&self, event: &Event) -> DomainResult<()> {
        match event.event_type {
            EventType::TaskCreated => {
                let task_code = event
                    .payload
                    .get("task_code")
                    .and_then(serde_json::Value::as_str)
                    .ok_or_else(|| {
                        DomainError::ValidationFailed("task_created without task_code".to_string())
                    })?;
                self.board.set_status(task_code, "ACTIVE", None).await
            }
            EventType::TaskUpdated => {
                let Some(task_code) = self.task_ids.get_taskcode(&event.correlation_id).await?
                else {
                    // tasks never registered with a code have no board entry
                    return Ok(());
                };
                if let Some(status) = event.payload.get("status").and_then(serde_json::Value::as_str)
                {
                    self.board
                        .set_status(task_code.as_str(), &status.to_uppercase(), None)
                        .await?;
                }
                Ok(())
            }
            EventType::VerdictGenerated => {
                let Some(task_code) =
                    event.payload.get("task_code").and_then(serde_json::Value::as_str)
                else {
                    return Ok(());
                };
                let status = event
                    .payload
                    .get("status")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_uppercase();
                let board_status = if status == "FAIL" { "FAILED" } else { "DONE" };
                let fail_codes: Vec<String> = event
                    .payload
                    .get("fail_codes")
                    .and_then(serde_json::Value::as_array)
                    .map(|codes| {
                        codes
                            .iter()
                            .filter_map(serde_json::Value::as_str)
                            .map(String::from)
                            .collect()
                    })
                    .unwrap_or_default();
                let artifacts = if fail_codes.is_empty() {
                    None
                } else {
                    Some(format!("fail_codes: {}", fail_codes.join(", ")))
                };
                self.board
                    .set_status(task_code, board_status, artifacts.as_deref())
                    .await
            }
            // subtask completion does not change the board; metrics are no-ops
            _ => Ok(()),
        }
    }
}

// ---- orchestrator lane ----

pub struct OrchestratorSubscriber {
    orchestrator: Arc<TaskOrchestrator>,
}

impl OrchestratorSubscriber {
    pub fn new(orchestrator: Arc<TaskOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl EventSubscriber for OrchestratorSubscriber {
    fn lane(&self) -> &'static str {
        "orchestrator"
    }

    async fn handle_event(&self, event: &Event) -> DomainResult<()> {
        match event.event_type {
            EventType::TaskCreated => {
                let Some(task_id) = TaskId::parse(&event.correlation_id) else {
                    return Ok(());
                };
                let task_data = event.payload.get("task_data").cloned().unwrap_or_default();
                let task = match serde_json::from_value::<Task>(task_data.clone()) {
                    Ok(task) => task,
                    Err(_) => {
                        // bridge-shaped payloads carry a reduced record
                        let task_code = task_data
                            .get("task_code")
                            .and_then(serde_json::Value::as_str)
                            .unwrap_or(event.correlation_id.as_str());
                        let goal = task_data
                            .get("goal")
                            .and_then(serde_json::Value::as_str)
                            .unwrap_or_default();
                        let created_by = task_data
                            .get("created_by")
                            .and_then(serde_json::Value::as_str)
                            .unwrap_or("aws_bridge");
                        Task::new(task_id.clone(), TaskCode::new(task_code), goal, created_by)
                    }
                };
                self.orchestrator.adopt_task(task).await?;
                Ok(())
            }
            EventType::TaskUpdated => {
                // status updates from outside flow into the task document
                let Some(status) = event
                    .payload
                    .get("status")
                    .and_then(serde_json::Value::as_str)
                    .and_then(TaskStatus::from_str)
                else {
                    return Ok(());
                };
                if let Ok(mut task) = self.orchestrator.get_task(&event.correlation_id).await {
                    if task.status != status {
                        task.status = status;
                        task.updated_at = chrono::Utc::now();
                        self.orchestrator.save_task(&task).await?;
                    }
                }
                Ok(())
            }
            // SubtaskCreated/SubtaskCompleted originate from the orchestrator
            // itself; VerdictGenerated is applied by the verdict handler
            _ => Ok(()),
        }
    }
}

// ---- external bridge lane ----

pub struct BridgeSubscriber {
    bridge: Arc<IngressBridge>,
}

impl BridgeSubscriber {
    pub fn new(bridge: Arc<IngressBridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl EventSubscriber for BridgeSubscriber {
    fn lane(&self) -> &'static str {
        "aws_bridge"
    }

    async fn handle_event(&self, event: &Event) -> DomainResult<()> {
        let external = self.bridge.convert_event(event).await?;
        self.bridge.push(&external).await
    }
}
