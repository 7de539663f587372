//! Event publishing: persist to the event store, then fan out one queue
//! message per subscriber lane.

use std::sync::Arc;

use crate::domain::errors::DomainResult;
use crate::domain::models::event::Event;
use crate::domain::ports::{EventStore, MessageQueue};

/// Subscriber lanes, in fan-out order.
pub const LANES: [&str; 3] = ["board", "orchestrator", "aws_bridge"];

/// Queue message id for an event on a lane. The board lane keeps the bare
/// event id; other lanes suffix it.
pub fn lane_message_id(event_id: &str, lane: &str) -> String {
    match lane {
        "board" => event_id.to_string(),
        "aws_bridge" => format!("{event_id}-aws"),
        other => format!("{event_id}-{other}"),
    }
}

#[derive(Clone)]
pub struct EventPublisher {
    store: Arc<dyn EventStore>,
    queue: Arc<dyn MessageQueue>,
}

impl EventPublisher {
    pub fn new(store: Arc<dyn EventStore>, queue: Arc<dyn MessageQueue>) -> Self {
        Self { store, queue }
    }

    pub fn store(&self) -> Arc<dyn EventStore> {
        self.store.clone()
    }

    /// Persist the event, then enqueue one copy per lane.
    ///
    /// A single publisher's events are observed by each lane in enqueue
    /// order; no order is guaranteed across lanes.
    pub async fn publish_event(&self, event: &Event) -> DomainResult<()> {
        self.store.append(event).await?;

        let event_id = event.event_id.to_string();
        let payload = serde_json::json!({
            "event_type": event.event_type.as_str(),
            "event_data": event,
        });
        for lane in LANES {
            self.queue
                .enqueue(
                    &lane_message_id(&event_id, lane),
                    Some(&event.correlation_id),
                    lane,
                    &payload,
                )
                .await?;
        }
        Ok(())
    }

    pub async fn publish_task_created(
        &self,
        task_id: &str,
        task_code: &str,
        source: &str,
        task_data: serde_json::Value,
    ) -> DomainResult<Event> {
        let event = Event::task_created(task_id, task_code, source, task_data);
        self.publish_event(&event).await?;
        Ok(event)
    }

    pub async fn publish_task_updated(
        &self,
        task_id: &str,
        source: &str,
        updates: serde_json::Value,
    ) -> DomainResult<Event> {
        let event = Event::task_updated(task_id, source, updates);
        self.publish_event(&event).await?;
        Ok(event)
    }

    pub async fn publish_subtask_completed(
        &self,
        task_id: &str,
        subtask_id: &str,
        source: &str,
        result: serde_json::Value,
    ) -> DomainResult<Event> {
        let event = Event::subtask_completed(task_id, subtask_id, source, result);
        self.publish_event(&event).await?;
        Ok(event)
    }

    pub async fn publish_verdict(
        &self,
        task_id: &str,
        task_code: Option<&str>,
        status: &str,
        fail_codes: &[String],
        verdict_data: serde_json::Value,
    ) -> DomainResult<Event> {
        let event = Event::verdict_generated(task_id, task_code, status, fail_codes, verdict_data);
        self.publish_event(&event).await?;
        Ok(event)
    }

    pub async fn publish_perf_metric(
        &self,
        task_id: &str,
        source: &str,
        mode: &str,
        metrics: serde_json::Value,
    ) -> DomainResult<Event> {
        let event = Event::perf_metric(task_id, source, mode, metrics);
        self.publish_event(&event).await?;
        Ok(event)
    }

    pub async fn publish_devloop_metric(
        &self,
        task_id: &str,
        source: &str,
        metrics: serde_json::Value,
    ) -> DomainResult<Event> {
        let event = Event::devloop_metric(task_id, source, metrics);
        self.publish_event(&event).await?;
        Ok(event)
    }
}
