//! External ingress bridge.
//!
//! Inbound: task-create / log-append / status-update requests from the
//! external ingress are mapped onto internal task ids, deduplicated by
//! `(request_id, task_id)`, and published as events. Outbound: internal
//! events are converted to the external payload shape and pushed to the
//! configured endpoint.

use backoff::ExponentialBackoffBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::adapters::sqlite::SqliteBridgeDedupe;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::event::{Event, EventType};
use crate::services::event_publisher::EventPublisher;
use crate::services::task_id::TaskIdManager;

const DEFAULT_AREA: &str = "AWS_INTAKE";

/// Ingress whitelist configuration. Two overlapping sets exist upstream;
/// the operator chooses which one gates task creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressConfig {
    #[serde(default = "IngressConfig::default_task_types")]
    pub task_types: HashSet<String>,
    #[serde(default = "IngressConfig::default_update_types")]
    pub update_types: HashSet<String>,
    /// Which set gates `task_create`: "task_types" or "update_types".
    #[serde(default = "IngressConfig::default_active")]
    pub active: String,
    /// External push endpoint; absent means log-and-ack.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl IngressConfig {
    fn default_task_types() -> HashSet<String> {
        ["RUN_PROMPT", "RUN_SCRIPT", "COLLECT_STATUS"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn default_update_types() -> HashSet<String> {
        ["TASK_CREATION", "TASK_UPDATE", "LOG_APPEND", "STATUS_UPDATE"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn default_active() -> String {
        "task_types".to_string()
    }

    fn active_set(&self) -> &HashSet<String> {
        if self.active == "update_types" {
            &self.update_types
        } else {
            &self.task_types
        }
    }
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            task_types: Self::default_task_types(),
            update_types: Self::default_update_types(),
            active: Self::default_active(),
            endpoint: None,
            api_key: None,
        }
    }
}

/// Inbound task-create request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngressTaskCreate {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub aws_task_id: Option<String>,
    #[serde(default)]
    pub aws_task_code: Option<String>,
    pub task_type: String,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub acceptance: Option<serde_json::Value>,
    #[serde(default)]
    pub expected: Option<serde_json::Value>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub law_ref: Option<String>,
    #[serde(default)]
    pub allowed_paths: Option<Vec<String>>,
    #[serde(default)]
    pub priority: Option<String>,
}

/// Response of a bridge operation, cached verbatim for idempotent replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeResponse {
    pub success: bool,
    pub t1_task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub message: String,
}

pub struct IngressBridge {
    config: IngressConfig,
    task_ids: TaskIdManager,
    publisher: EventPublisher,
    dedupe: SqliteBridgeDedupe,
    http: reqwest::Client,
}

impl IngressBridge {
    pub fn new(
        config: IngressConfig,
        task_ids: TaskIdManager,
        publisher: EventPublisher,
        dedupe: SqliteBridgeDedupe,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { config, task_ids, publisher, dedupe, http }
    }

    /// AWS → internal task-id mapping: a `{AREA}__{YYYYMMDD}` task code
    /// keeps its area and date, anything else generates under the default
    /// ingress area.
    async fn resolve_task_id(
        &self,
        aws_task_code: Option<&str>,
        area_override: Option<&str>,
    ) -> DomainResult<crate::domain::models::task_id::TaskId> {
        if let Some(code) = aws_task_code {
            let code = crate::domain::models::task_id::TaskCode::new(code);
            if let Some((area, date)) = code.split_area_date() {
                let area = area_override.unwrap_or(area);
                return self.task_ids.generate(area, Some(date), None).await;
            }
        }
        self.task_ids
            .generate(area_override.unwrap_or(DEFAULT_AREA), None, None)
            .await
    }

    /// Handle a task-create request from the ingress.
    pub async fn handle_task_create(&self, req: IngressTaskCreate) -> DomainResult<BridgeResponse> {
        if !self.config.active_set().contains(&req.task_type) {
            return Err(DomainError::ValidationFailed(format!(
                "Task type '{}' not in whitelist",
                req.task_type
            )));
        }

        let request_id = req
            .request_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        // a known external id keeps its mapped internal id, so replays of
        // the same request resolve to the same task
        let existing = match &req.aws_task_id {
            Some(aws_id) => self.dedupe.lookup_internal(aws_id).await?,
            None => None,
        };
        let t1_task_id = match existing.as_deref().and_then(crate::domain::models::task_id::TaskId::parse) {
            Some(id) => id,
            None => {
                let id = self
                    .resolve_task_id(req.aws_task_code.as_deref(), req.area.as_deref())
                    .await?;
                if let Some(aws_id) = &req.aws_task_id {
                    self.dedupe.map_external_task_id(aws_id, id.as_str()).await?;
                }
                id
            }
        };

        // idempotency gate before any event is published
        if let Some(prev) = self.dedupe.get(&request_id, t1_task_id.as_str()).await? {
            return Ok(serde_json::from_value(prev)?);
        }

        let task_code = req
            .aws_task_code
            .clone()
            .unwrap_or_else(|| format!("AWS-{t1_task_id}"));
        // bind the legacy code to the new id so verdicts and board updates
        // correlate; an already-bound code keeps its first binding
        if self
            .task_ids
            .register_mapping(&crate::domain::models::task_id::TaskCode::new(task_code.clone()), &t1_task_id)
            .await
            .is_err()
        {
            tracing::debug!(task_code = %task_code, "taskcode already mapped; keeping first binding");
        }
        let goal = req
            .goal
            .clone()
            .or_else(|| req.instructions.clone())
            .or_else(|| req.prompt.clone())
            .unwrap_or_default();
        let acceptance = normalize_string_list(req.acceptance.clone().or_else(|| req.expected.clone()));
        let created_by = req
            .created_by
            .clone()
            .or_else(|| req.user_id.clone())
            .unwrap_or_else(|| "aws_user".to_string());

        let task_data = serde_json::json!({
            "task_id": t1_task_id.as_str(),
            "task_code": task_code,
            "goal": goal,
            "constraints": {
                "law_ref": req.law_ref,
                "allowed_paths": req.allowed_paths.clone().unwrap_or_default(),
            },
            "acceptance": acceptance,
            "status": "pending",
            "created_by": created_by,
        });

        let event = self
            .publisher
            .publish_task_created(t1_task_id.as_str(), &task_code, "aws_bridge", task_data)
            .await?;

        let response = BridgeResponse {
            success: true,
            t1_task_id: t1_task_id.to_string(),
            aws_task_id: req.aws_task_id.clone(),
            task_code: Some(task_code),
            event_id: Some(event.event_id.to_string()),
            message: "Task created successfully".to_string(),
        };
        self.dedupe
            .record_or_get(&request_id, t1_task_id.as_str(), &serde_json::to_value(&response)?)
            .await?;
        Ok(response)
    }

    /// Handle a log-append request: publish `TaskUpdated` carrying the log.
    pub async fn handle_log_append(
        &self,
        request_id: Option<String>,
        aws_task_id: &str,
        log_data: serde_json::Value,
    ) -> DomainResult<BridgeResponse> {
        let request_id = request_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let t1_task_id = self
            .dedupe
            .lookup_internal(aws_task_id)
            .await?
            .unwrap_or_else(|| aws_task_id.to_string());

        if let Some(prev) = self.dedupe.get(&request_id, &t1_task_id).await? {
            return Ok(serde_json::from_value(prev)?);
        }

        let event = self
            .publisher
            .publish_task_updated(
                &t1_task_id,
                "aws_bridge",
                serde_json::json!({
                    "update_type": "log_append",
                    "log_data": log_data,
                }),
            )
            .await?;

        let response = BridgeResponse {
            success: true,
            t1_task_id: t1_task_id.clone(),
            aws_task_id: Some(aws_task_id.to_string()),
            task_code: None,
            event_id: Some(event.event_id.to_string()),
            message: "Log appended successfully".to_string(),
        };
        self.dedupe
            .record_or_get(&request_id, &t1_task_id, &serde_json::to_value(&response)?)
            .await?;
        Ok(response)
    }

    /// Handle a status-update request.
    pub async fn handle_status_update(
        &self,
        request_id: Option<String>,
        aws_task_id: &str,
        status: &str,
        status_data: serde_json::Value,
    ) -> DomainResult<BridgeResponse> {
        let request_id = request_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let t1_task_id = self
            .dedupe
            .lookup_internal(aws_task_id)
            .await?
            .unwrap_or_else(|| aws_task_id.to_string());

        if let Some(prev) = self.dedupe.get(&request_id, &t1_task_id).await? {
            return Ok(serde_json::from_value(prev)?);
        }

        let event = self
            .publisher
            .publish_task_updated(
                &t1_task_id,
                "aws_bridge",
                serde_json::json!({
                    "update_type": "status_update",
                    "status": status,
                    "status_data": status_data,
                }),
            )
            .await?;

        let response = BridgeResponse {
            success: true,
            t1_task_id: t1_task_id.clone(),
            aws_task_id: Some(aws_task_id.to_string()),
            task_code: None,
            event_id: Some(event.event_id.to_string()),
            message: "Status updated successfully".to_string(),
        };
        self.dedupe
            .record_or_get(&request_id, &t1_task_id, &serde_json::to_value(&response)?)
            .await?;
        Ok(response)
    }

    /// Convert an internal event into the external payload shape.
    pub async fn convert_event(&self, event: &Event) -> DomainResult<serde_json::Value> {
        let t1_task_id = event.correlation_id.clone();
        let aws_task_id = self.dedupe.lookup_external(&t1_task_id).await?;

        let mut external = serde_json::json!({
            "event_id": event.event_id.to_string(),
            "event_type": event.event_type.as_str(),
            "task_id": aws_task_id.clone().unwrap_or_else(|| t1_task_id.clone()),
            "t1_task_id": t1_task_id,
            "timestamp": event.timestamp,
            "source": event.source,
            "payload": event.payload,
        });

        match event.event_type {
            EventType::VerdictGenerated => {
                external["verdict"] = serde_json::json!({
                    "status": event.payload.get("status"),
                    "fail_codes": event.payload.get("fail_codes").cloned().unwrap_or(serde_json::json!([])),
                    "task_code": event.payload.get("task_code"),
                });
            }
            EventType::SubtaskCompleted => {
                external["subtask"] = serde_json::json!({
                    "subtask_id": event.payload.get("subtask_id"),
                    "result": event.payload.get("result"),
                });
            }
            EventType::TaskUpdated => {
                match event.payload.get("update_type").and_then(serde_json::Value::as_str) {
                    Some("log_append") => {
                        external["log"] =
                            event.payload.get("log_data").cloned().unwrap_or(serde_json::Value::Null);
                    }
                    Some("status_update") => {
                        external["status"] =
                            event.payload.get("status").cloned().unwrap_or(serde_json::Value::Null);
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        Ok(external)
    }

    /// Push an external payload to the configured endpoint with exponential
    /// backoff. With no endpoint configured this logs and succeeds.
    pub async fn push(&self, payload: &serde_json::Value) -> DomainResult<()> {
        let Some(endpoint) = &self.config.endpoint else {
            tracing::info!(payload = %payload, "no external endpoint configured; logging event");
            return Ok(());
        };

        let url = format!("{}/events", endpoint.trim_end_matches('/'));
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_secs(1))
            .with_max_interval(Duration::from_secs(4))
            .with_max_elapsed_time(Some(Duration::from_secs(15)))
            .build();

        let push_once = || async {
            let mut request = self.http.post(&url).json(payload);
            if let Some(key) = &self.config.api_key {
                request = request.bearer_auth(key);
            }
            let response = request
                .send()
                .await
                .map_err(|e| backoff::Error::transient(DomainError::BridgePush(e.to_string())))?;
            if response.status().is_success() {
                Ok(())
            } else {
                Err(backoff::Error::transient(DomainError::BridgePush(format!(
                    "endpoint returned {}",
                    response.status()
                ))))
            }
        };

        backoff::future::retry(backoff, push_once).await.map_err(|e| match e {
            DomainError::BridgePush(_) => e,
            other => DomainError::BridgePush(other.to_string()),
        })
    }
}

fn normalize_string_list(value: Option<serde_json::Value>) -> Vec<String> {
    match value {
        Some(serde_json::Value::String(s)) => vec![s],
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        _ => Vec::new(),
    }
}
