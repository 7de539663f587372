//! Event envelope and event types.
//!
//! Events are append-only: once persisted to the event store they are never
//! mutated. The `correlation_id` names the task or subtask the event is about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of event flowing through the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TaskCreated,
    TaskUpdated,
    SubtaskCreated,
    SubtaskCompleted,
    VerdictGenerated,
    MessageSent,
    MessageReceived,
    PerfMetric,
    DevloopMetric,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskCreated => "task_created",
            Self::TaskUpdated => "task_updated",
            Self::SubtaskCreated => "subtask_created",
            Self::SubtaskCompleted => "subtask_completed",
            Self::VerdictGenerated => "verdict_generated",
            Self::MessageSent => "message_sent",
            Self::MessageReceived => "message_received",
            Self::PerfMetric => "perf_metric",
            Self::DevloopMetric => "devloop_metric",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "task_created" => Some(Self::TaskCreated),
            "task_updated" => Some(Self::TaskUpdated),
            "subtask_created" => Some(Self::SubtaskCreated),
            "subtask_completed" => Some(Self::SubtaskCompleted),
            "verdict_generated" => Some(Self::VerdictGenerated),
            "message_sent" => Some(Self::MessageSent),
            "message_received" => Some(Self::MessageReceived),
            "perf_metric" => Some(Self::PerfMetric),
            "devloop_metric" => Some(Self::DevloopMetric),
            _ => None,
        }
    }
}

/// Immutable event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Uuid,
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// The task_id or subtask_id this event is about.
    pub correlation_id: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    /// Agent id or component name that emitted the event.
    pub source: String,
}

impl Event {
    pub fn new(
        event_type: EventType,
        correlation_id: impl Into<String>,
        payload: serde_json::Value,
        source: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            correlation_id: correlation_id.into(),
            payload,
            timestamp: Utc::now(),
            source: source.into(),
        }
    }

    pub fn task_created(
        task_id: &str,
        task_code: &str,
        source: &str,
        task_data: serde_json::Value,
    ) -> Self {
        Self::new(
            EventType::TaskCreated,
            task_id,
            serde_json::json!({
                "task_id": task_id,
                "task_code": task_code,
                "task_data": task_data,
            }),
            source,
        )
    }

    pub fn task_updated(task_id: &str, source: &str, updates: serde_json::Value) -> Self {
        Self::new(EventType::TaskUpdated, task_id, updates, source)
    }

    pub fn subtask_created(
        task_id: &str,
        subtask: serde_json::Value,
        reason: &str,
        source: &str,
    ) -> Self {
        let correlation = subtask
            .get("subtask_id")
            .and_then(|v| v.as_str())
            .unwrap_or(task_id)
            .to_string();
        Self::new(
            EventType::SubtaskCreated,
            correlation,
            serde_json::json!({
                "task_id": task_id,
                "subtask": subtask,
                "reason": reason,
            }),
            source,
        )
    }

    pub fn subtask_completed(
        task_id: &str,
        subtask_id: &str,
        source: &str,
        result: serde_json::Value,
    ) -> Self {
        Self::new(
            EventType::SubtaskCompleted,
            subtask_id,
            serde_json::json!({
                "task_id": task_id,
                "subtask_id": subtask_id,
                "result": result,
            }),
            source,
        )
    }

    pub fn verdict_generated(
        task_id: &str,
        task_code: Option<&str>,
        status: &str,
        fail_codes: &[String],
        verdict_data: serde_json::Value,
    ) -> Self {
        let mut payload = match verdict_data {
            serde_json::Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("verdict".to_string(), other);
                map
            }
        };
        payload.insert("status".to_string(), serde_json::json!(status));
        payload.insert("fail_codes".to_string(), serde_json::json!(fail_codes));
        if let Some(code) = task_code {
            payload.insert("task_code".to_string(), serde_json::json!(code));
        }
        Self::new(
            EventType::VerdictGenerated,
            task_id,
            serde_json::Value::Object(payload),
            "ci_gate",
        )
    }

    pub fn perf_metric(task_id: &str, source: &str, mode: &str, metrics: serde_json::Value) -> Self {
        Self::new(
            EventType::PerfMetric,
            task_id,
            serde_json::json!({
                "metric_type": "startup_performance",
                "mode": mode,
                "metrics": metrics,
            }),
            source,
        )
    }

    pub fn devloop_metric(task_id: &str, source: &str, metrics: serde_json::Value) -> Self {
        Self::new(
            EventType::DevloopMetric,
            task_id,
            serde_json::json!({
                "metric_type": "devloop_performance",
                "metrics": metrics,
            }),
            source,
        )
    }
}
