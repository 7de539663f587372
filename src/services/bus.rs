//! The tool-call surface of the bus.
//!
//! Tool calls arrive as `{name, arguments}` envelopes with an implicit auth
//! context. Admin gates run before any other work, including the
//! idempotency lookup. Every call is audit-logged.

use chrono::Utc;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use crate::domain::errors::DomainError;
use crate::domain::models::message::{MessageKind, MessageStatus};
use crate::domain::models::outbox::OutboxStatus;
use crate::domain::models::pack::validate_canonical_pack;
use crate::domain::models::task::{Priority, SubtaskStatus};
use crate::infrastructure::config::StateConfig;
use crate::infrastructure::logging::AuditLogger;
use crate::services::aggregator::{MergeStrategy, ResultAggregator};
use crate::services::board::BoardWriter;
use crate::services::bridge::{IngressBridge, IngressTaskCreate};
use crate::services::coordinator::{AgentCoordinator, RegisterAgent};
use crate::services::messenger::Messenger;
use crate::services::orchestrator::{CreateTask, TaskOrchestrator};
use crate::services::outbox::{OutboxService, ReviewAction};
use crate::services::router::{RoutableTask, TaskRouter};
use crate::services::verdict::VerdictHandler;
use crate::services::workflow_engine::WorkflowEngine;

/// Tools that hard-require admin privileges (fail-closed).
pub const ADMIN_TOOLS: [&str; 12] = [
    "inbox_append",
    "board_set_status",
    "doc_patch",
    "ata_send",
    "ata_send_review",
    "task_create",
    "agent_register",
    "agent_approve",
    "workflow_execute",
    "result_get",
    "admin_vault_put",
    "admin_vault_get",
];

/// Authentication context carried by every call. Admin is a capability on
/// the context, never derived later.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub caller: String,
    pub user_agent: Option<String>,
    pub trace_id: Option<String>,
    pub is_admin: bool,
}

impl AuthContext {
    pub fn admin(caller: impl Into<String>) -> Self {
        Self { caller: caller.into(), user_agent: None, trace_id: None, is_admin: true }
    }

    pub fn user(caller: impl Into<String>) -> Self {
        Self { caller: caller.into(), user_agent: None, trace_id: None, is_admin: false }
    }
}

pub struct ToolBus {
    state: StateConfig,
    coordinator: Arc<AgentCoordinator>,
    outbox: Arc<OutboxService>,
    messenger: Arc<Messenger>,
    orchestrator: Arc<TaskOrchestrator>,
    workflow_engine: Arc<WorkflowEngine>,
    verdict_handler: Arc<VerdictHandler>,
    aggregator: Arc<ResultAggregator>,
    bridge: Arc<IngressBridge>,
    board: Arc<BoardWriter>,
    audit: Arc<AuditLogger>,
    router: TaskRouter,
    /// Per-request_id result cache; lives for the process lifetime.
    idempotency: Mutex<HashMap<String, Value>>,
}

impl ToolBus {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: StateConfig,
        coordinator: Arc<AgentCoordinator>,
        outbox: Arc<OutboxService>,
        messenger: Arc<Messenger>,
        orchestrator: Arc<TaskOrchestrator>,
        workflow_engine: Arc<WorkflowEngine>,
        verdict_handler: Arc<VerdictHandler>,
        aggregator: Arc<ResultAggregator>,
        bridge: Arc<IngressBridge>,
        board: Arc<BoardWriter>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        let router = TaskRouter::new(coordinator.clone());
        Self {
            state,
            coordinator,
            outbox,
            messenger,
            orchestrator,
            workflow_engine,
            verdict_handler,
            aggregator,
            bridge,
            board,
            audit,
            router,
            idempotency: Mutex::new(HashMap::new()),
        }
    }

    /// Dispatch one tool call. Always returns a `{success, ...}` object.
    pub async fn execute(&self, name: &str, args: Value, auth: &AuthContext) -> Value {
        let started = Instant::now();

        // the admin gate runs before everything else, idempotency included
        if ADMIN_TOOLS.contains(&name) && !auth.is_admin {
            let result = json!({
                "success": false,
                "error": format!("ADMIN_REQUIRED: {name} requires ATA admin privileges (fail-closed)"),
            });
            self.audit_call(name, &args, auth, &result, started).await;
            return result;
        }

        if let Some(request_id) = args.get("request_id").and_then(Value::as_str) {
            let cache = self.idempotency.lock().await;
            if let Some(cached) = cache.get(&cache_key(name, request_id)) {
                return cached.clone();
            }
        }

        let result = self.dispatch(name, &args, auth).await;
        let result = match result {
            Ok(value) => value,
            Err(e) => json!({"success": false, "error": e.to_string()}),
        };

        if let Some(request_id) = args.get("request_id").and_then(Value::as_str) {
            let mut cache = self.idempotency.lock().await;
            cache.insert(cache_key(name, request_id), result.clone());
        }

        self.audit_call(name, &args, auth, &result, started).await;
        result
    }

    async fn audit_call(
        &self,
        name: &str,
        args: &Value,
        auth: &AuthContext,
        result: &Value,
        started: Instant,
    ) {
        let success = result.get("success").and_then(Value::as_bool).unwrap_or(false);
        let error = result.get("error").and_then(Value::as_str);
        let latency = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if let Err(e) = self
            .audit
            .log_tool_call(
                name,
                &auth.caller,
                auth.user_agent.as_deref(),
                auth.trace_id.as_deref(),
                "default",
                args,
                success,
                latency,
                error,
            )
            .await
        {
            tracing::warn!(error = %e, "audit write failed");
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn dispatch(
        &self,
        name: &str,
        args: &Value,
        auth: &AuthContext,
    ) -> Result<Value, DomainError> {
        match name {
            "echo" => Ok(json!({"success": true, "echo": args.get("message").cloned()})),
            "ping" => Ok(json!({"success": true, "pong": Utc::now().to_rfc3339()})),

            // ---- messaging ----
            "ata_send_request" => self.ata_send_request(args, auth).await,
            "ata_send_review" => self.ata_send_review(args, auth).await,
            "ata_send" => self.ata_send(args).await,
            "ata_receive" => {
                let agent_id = require_str(args, "agent_id")?;
                let messages = self.messenger.unread_for(agent_id).await?;
                Ok(json!({
                    "success": true,
                    "count": messages.len(),
                    "messages": messages,
                }))
            }
            "ata_message_mark" => {
                let status = match args.get("status").and_then(Value::as_str) {
                    Some("acked") => MessageStatus::Acked,
                    _ => MessageStatus::Read,
                };
                let msg_ids: Vec<String> = args
                    .get("msg_ids")
                    .and_then(Value::as_array)
                    .map(|ids| {
                        ids.iter().filter_map(Value::as_str).map(String::from).collect()
                    })
                    .unwrap_or_default();
                if msg_ids.is_empty() {
                    return Err(DomainError::ValidationFailed("msg_ids is required".to_string()));
                }
                let mut marked = Vec::new();
                for msg_id in &msg_ids {
                    if self.messenger.mark(msg_id, status).await? {
                        marked.push(msg_id.clone());
                    }
                }
                Ok(json!({"success": true, "marked": marked}))
            }

            // ---- agents ----
            "agent_register" => {
                let params = register_params(args)?;
                let record = self.coordinator.register_agent(params).await?;
                Ok(json!({
                    "success": true,
                    "agent_id": record.agent_id,
                    "numeric_code": record.numeric_code,
                    "send_enabled": record.send_enabled,
                    "role": record.role,
                    "status": record.status.as_str(),
                }))
            }
            "agent_apply" => {
                let params = register_params(args)?;
                let note = args.get("note").and_then(Value::as_str).map(String::from);
                let app = self.coordinator.agent_apply(params, &auth.caller, note).await?;
                Ok(json!({
                    "success": true,
                    "agent_id": app.agent_id,
                    "status": app.status,
                }))
            }
            "agent_approve" => {
                let agent_id = require_str(args, "agent_id")?;
                let numeric_code = args
                    .get("numeric_code")
                    .and_then(Value::as_u64)
                    .and_then(|c| u8::try_from(c).ok());
                let send_enabled = args.get("send_enabled").and_then(Value::as_bool);
                let record = self
                    .coordinator
                    .agent_approve(agent_id, &auth.caller, numeric_code, send_enabled)
                    .await?;
                Ok(json!({
                    "success": true,
                    "agent_id": record.agent_id,
                    "numeric_code": record.numeric_code,
                    "send_enabled": record.send_enabled,
                }))
            }
            "agent_list" => {
                let agents = self.coordinator.all_agents().await;
                Ok(json!({"success": true, "count": agents.len(), "agents": agents}))
            }

            // ---- tasks ----
            "task_create" => {
                let description = require_str(args, "description")?;
                let mut params = CreateTask::new(description);
                params.workflow_template =
                    args.get("workflow_template").and_then(Value::as_str).map(String::from);
                if let Some(priority) =
                    args.get("priority").and_then(Value::as_str).and_then(Priority::from_str)
                {
                    params.priority = priority;
                }
                params.timeout_seconds = args.get("timeout").and_then(Value::as_u64);
                params.required_roles = args.get("required_roles").and_then(Value::as_array).map(
                    |roles| roles.iter().filter_map(Value::as_str).map(String::from).collect(),
                );
                params.task_code =
                    args.get("task_code").and_then(Value::as_str).map(String::from);
                params.created_by.clone_from(&auth.caller);
                let created = self.orchestrator.create_task(params).await?;
                Ok(json!({
                    "success": true,
                    "task_id": created.task_id.as_str(),
                    "status": created.status.as_str(),
                    "subtasks_count": created.subtasks_count,
                    "estimated_duration": created.estimated_duration,
                    "can_parallelize": created.can_parallelize,
                }))
            }
            "task_status" | "ata_task_status" => {
                let task_id = require_str(args, "task_id")?;
                let task = self.orchestrator.get_task(task_id).await?;
                Ok(json!({
                    "success": true,
                    "task_id": task.task_id.as_str(),
                    "status": task.status.as_str(),
                    "subtasks": task.plan.subtasks,
                    "progress": task.progress(),
                }))
            }
            "subtask_update" => {
                let task_id = require_str(args, "task_id")?;
                let subtask_id = require_str(args, "subtask_id")?;
                let status = args
                    .get("status")
                    .and_then(Value::as_str)
                    .and_then(SubtaskStatus::from_str)
                    .ok_or_else(|| {
                        DomainError::ValidationFailed("invalid subtask status".to_string())
                    })?;
                let task = self
                    .orchestrator
                    .update_subtask_status(
                        task_id,
                        subtask_id,
                        status,
                        args.get("assigned_agent").and_then(Value::as_str).map(String::from),
                        args.get("result").cloned(),
                        args.get("error").and_then(Value::as_str).map(String::from),
                    )
                    .await?;
                Ok(json!({
                    "success": true,
                    "task_id": task_id,
                    "subtask_id": subtask_id,
                    "status": status.as_str(),
                    "task_status": task.status.as_str(),
                }))
            }
            "result_get" => {
                let task_id = require_str(args, "task_id")?;
                let strategy = match args.get("merge_strategy").and_then(Value::as_str) {
                    Some("concatenate") => MergeStrategy::Concatenate,
                    Some("voting") => MergeStrategy::Voting,
                    Some("weighted") => MergeStrategy::Weighted,
                    _ => MergeStrategy::Intelligent,
                };
                let include_intermediate = args
                    .get("include_intermediate")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let merged = self
                    .aggregator
                    .get_result(task_id, strategy, None, include_intermediate)
                    .await?;
                Ok(json!({"success": true, "task_id": task_id, "merged": merged}))
            }

            // ---- workflows ----
            "workflow_execute" => {
                let workflow_name = require_str(args, "workflow_name")?;
                let inputs = args
                    .get("inputs")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                let task_id = args.get("task_id").and_then(Value::as_str).map(String::from);
                let started = self
                    .workflow_engine
                    .execute_workflow(workflow_name, inputs, task_id)
                    .await?;
                Ok(json!({
                    "success": true,
                    "instance_id": started.instance_id,
                    "workflow_name": started.workflow_name,
                    "status": started.status,
                    "steps_count": started.steps_count,
                }))
            }
            "workflow_status" => {
                let instance_id = require_str(args, "instance_id")?;
                let instance = self.workflow_engine.get_instance(instance_id).await?;
                let (total, completed, percentage) = instance.progress();
                Ok(json!({
                    "success": true,
                    "instance_id": instance.instance_id,
                    "status": instance.status,
                    "current_step": instance.current_step,
                    "steps": instance.steps,
                    "outputs": instance.outputs,
                    "progress": {"total": total, "completed": completed, "percentage": percentage},
                }))
            }

            // ---- system hooks ----
            "ata_task_create" => {
                let req: IngressTaskCreate = serde_json::from_value(args.clone())?;
                let routable = RoutableTask {
                    goal: req.goal.clone().unwrap_or_default(),
                    capsule: args
                        .get("capsule")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    how_to_repro: args
                        .get("how_to_repro")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    expected: args
                        .get("expected")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    metadata: args
                        .get("metadata")
                        .map(std::string::ToString::to_string)
                        .unwrap_or_default(),
                    owner_role: args
                        .get("owner_role")
                        .and_then(Value::as_str)
                        .map(String::from),
                };
                let response = self.bridge.handle_task_create(req).await?;
                let decision = self.router.route(&routable).await;
                let mut value = serde_json::to_value(&response)?;
                value["routing"] = serde_json::to_value(&decision)?;
                Ok(value)
            }
            "ata_task_result" => self.ata_task_result(args).await,
            "ata_ci_verify" => {
                let outcome = if let Some(path) = args.get("verdict_path").and_then(Value::as_str)
                {
                    self.verdict_handler
                        .process_verdict_file(std::path::Path::new(path))
                        .await?
                } else {
                    let verdict = args
                        .get("verdict")
                        .cloned()
                        .ok_or_else(|| {
                            DomainError::ValidationFailed(
                                "verdict or verdict_path is required".to_string(),
                            )
                        })?;
                    self.verdict_handler.process_verdict(verdict).await?
                };
                Ok(json!({
                    "success": true,
                    "task_id": outcome.task_id,
                    "status": outcome.status.as_str(),
                    "fail_codes": outcome.fail_codes,
                    "repair_subtasks_created": outcome.repair_subtasks_created,
                }))
            }

            // ---- board / inbox / docs / vault ----
            "board_get" => {
                let content = self.board.read().await?;
                Ok(json!({"success": true, "content": content, "rev": content_rev(&content)}))
            }
            "board_set_status" => {
                let task_code = require_str(args, "task_code")?;
                let status = require_str(args, "status")?;
                let artifacts = args.get("artifacts").and_then(Value::as_str);
                self.board.set_status(task_code, status, artifacts).await?;
                Ok(json!({"success": true, "task_code": task_code, "status": status}))
            }
            "inbox_append" => {
                let text = require_str(args, "entry")?;
                let path = self
                    .state
                    .inbox_dir()
                    .join(format!("{}.md", Utc::now().format("%Y-%m-%d")));
                tokio::fs::create_dir_all(self.state.inbox_dir()).await?;
                let mut existing = match tokio::fs::read_to_string(&path).await {
                    Ok(content) => content,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
                    Err(e) => return Err(e.into()),
                };
                existing.push_str(&format!("- {} {}\n", Utc::now().format("%H:%M:%S"), text));
                tokio::fs::write(&path, existing).await?;
                Ok(json!({"success": true, "path": path.to_string_lossy()}))
            }
            "inbox_tail" => {
                let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(20) as usize;
                let path = self
                    .state
                    .inbox_dir()
                    .join(format!("{}.md", Utc::now().format("%Y-%m-%d")));
                let content = match tokio::fs::read_to_string(&path).await {
                    Ok(content) => content,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
                    Err(e) => return Err(e.into()),
                };
                let lines: Vec<&str> = content.lines().collect();
                let tail: Vec<&str> =
                    lines.iter().rev().take(limit).rev().copied().collect();
                Ok(json!({"success": true, "lines": tail}))
            }
            "doc_patch" => self.doc_patch(args).await,
            "admin_vault_put" => {
                let key = require_str(args, "key")?;
                let value = args.get("value").cloned().unwrap_or(Value::Null);
                let path = self.state.vault_dir().join("vault.json");
                tokio::fs::create_dir_all(self.state.vault_dir()).await?;
                let mut vault: serde_json::Map<String, Value> =
                    match tokio::fs::read_to_string(&path).await {
                        Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
                        Err(_) => serde_json::Map::new(),
                    };
                vault.insert(key.to_string(), value);
                tokio::fs::write(&path, serde_json::to_string_pretty(&vault)?).await?;
                Ok(json!({"success": true, "key": key}))
            }
            "admin_vault_get" => {
                let key = require_str(args, "key")?;
                let path = self.state.vault_dir().join("vault.json");
                let vault: serde_json::Map<String, Value> =
                    match tokio::fs::read_to_string(&path).await {
                        Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
                        Err(_) => serde_json::Map::new(),
                    };
                Ok(json!({"success": true, "key": key, "value": vault.get(key)}))
            }

            other => Err(DomainError::ValidationFailed(format!("Unknown tool: {other}"))),
        }
    }

    async fn ata_send_request(
        &self,
        args: &Value,
        auth: &AuthContext,
    ) -> Result<Value, DomainError> {
        let payload = args
            .get("payload")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| DomainError::ValidationFailed("payload is required".to_string()))?;
        let request = self
            .outbox
            .send_request(
                require_str(args, "taskcode")?,
                require_str(args, "from_agent")?,
                require_str(args, "to_agent")?,
                args.get("kind")
                    .and_then(Value::as_str)
                    .and_then(MessageKind::from_str)
                    .unwrap_or(MessageKind::Request),
                payload,
                args.get("priority")
                    .and_then(Value::as_str)
                    .and_then(Priority::from_str)
                    .unwrap_or(Priority::Normal),
                args.get("requires_response").and_then(Value::as_bool).unwrap_or(true),
                args.get("context_hint").and_then(Value::as_str).map(String::from),
                args.get("report_path").and_then(Value::as_str).map(String::from),
                args.get("selftest_log_path").and_then(Value::as_str).map(String::from),
                args.get("evidence_dir").and_then(Value::as_str).map(String::from),
                &auth.caller,
            )
            .await?;
        Ok(json!({
            "success": true,
            "request_id": request.request_id,
            "status": request.status.as_str(),
        }))
    }

    async fn ata_send_review(
        &self,
        args: &Value,
        auth: &AuthContext,
    ) -> Result<Value, DomainError> {
        let action = match require_str(args, "action")?.to_lowercase().as_str() {
            "approve" => ReviewAction::Approve,
            "reject" => ReviewAction::Reject,
            other => {
                return Err(DomainError::ValidationFailed(format!(
                    "action must be 'approve' or 'reject', got: {other}"
                )));
            }
        };
        let outcome = self
            .outbox
            .review(
                require_str(args, "request_id")?,
                action,
                args.get("reason").and_then(Value::as_str).map(String::from),
                &auth.caller,
            )
            .await;

        match outcome {
            Ok(outcome) => Ok(json!({
                "success": true,
                "request_id": outcome.request_id,
                "status": outcome.status.as_str(),
                "send_result": outcome.send_result,
                "reason": outcome.reason,
            })),
            Err(DomainError::TemplateInvalid(reason)) => Ok(json!({
                "success": false,
                "status": OutboxStatus::Rejected.as_str(),
                "error": reason,
            })),
            Err(e) => Err(e),
        }
    }

    /// Direct send. Admin-only (gated by `execute`); re-validation of
    /// registration, send policy, and the comm prefix happens inside the
    /// messenger, fail-closed.
    async fn ata_send(&self, args: &Value) -> Result<Value, DomainError> {
        let payload = args
            .get("payload")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| DomainError::ValidationFailed("payload is required".to_string()))?;
        let sent = self
            .messenger
            .send(crate::services::messenger::SendMessage {
                taskcode: require_str(args, "taskcode")?.to_string(),
                from_agent: require_str(args, "from_agent")?.to_string(),
                to_agent: require_str(args, "to_agent")?.to_string(),
                kind: args
                    .get("kind")
                    .and_then(Value::as_str)
                    .and_then(MessageKind::from_str)
                    .unwrap_or(MessageKind::Request),
                payload,
                prev_sha256: args.get("prev_sha256").and_then(Value::as_str).map(String::from),
                priority: args.get("priority").and_then(Value::as_str).and_then(Priority::from_str),
                requires_response: args
                    .get("requires_response")
                    .and_then(Value::as_bool)
                    .unwrap_or(true),
                context_hint: args.get("context_hint").and_then(Value::as_str).map(String::from),
            })
            .await?;
        Ok(json!({
            "success": true,
            "msg_id": sent.msg_id,
            "sha256": sent.sha256,
            "file_path": sent.file_path,
            "priority": sent.priority.as_str(),
        }))
    }

    /// A2A canonical result pack intake: shape-validate, then record the
    /// result against the pack's task.
    async fn ata_task_result(&self, args: &Value) -> Result<Value, DomainError> {
        let verdict = validate_canonical_pack(args);
        if !verdict.valid {
            return Ok(json!({
                "success": false,
                "valid": false,
                "reason_code": verdict.reason_code,
                "error": verdict.message,
            }));
        }

        let task_code = args
            .get("task_code")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let outcome = self
            .verdict_handler
            .process_verdict(json!({
                "task_code": task_code,
                "status": args.get("status"),
                "result_pack": args,
            }))
            .await?;
        Ok(json!({
            "success": true,
            "valid": true,
            "task_id": outcome.task_id,
            "status": outcome.status.as_str(),
        }))
    }

    /// Patch a state document with an optional base-rev check. A mismatch
    /// returns a conflict carrying the current rev; no write happens.
    async fn doc_patch(&self, args: &Value) -> Result<Value, DomainError> {
        let rel_path = require_str(args, "path")?;
        if !crate::domain::models::outbox::is_repo_relative_path(Some(rel_path)) {
            return Err(DomainError::ValidationFailed(format!(
                "path must be repo-relative: {rel_path}"
            )));
        }
        let content = require_str(args, "content")?;
        let path = self.state.docs_dir().join(rel_path);

        let current = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let current_rev = content_rev(&current);

        if let Some(base_rev) = args.get("base_rev").and_then(Value::as_str) {
            if base_rev != current_rev {
                return Err(DomainError::RevConflict { current_rev });
            }
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        Ok(json!({"success": true, "path": rel_path, "rev": content_rev(content)}))
    }
}

fn cache_key(tool: &str, request_id: &str) -> String {
    format!("{tool}:{request_id}")
}

/// Revision of a document: 16 hex chars of its content hash.
pub fn content_rev(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))[..16].to_string()
}

fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, DomainError> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| DomainError::ValidationFailed(format!("{key} is required")))
}

fn register_params(args: &Value) -> Result<RegisterAgent, DomainError> {
    let mut params = RegisterAgent::new(
        require_str(args, "agent_id")?,
        args.get("agent_type").and_then(Value::as_str).unwrap_or("unknown"),
        args.get("role").and_then(Value::as_str).unwrap_or("implementer"),
    );
    params.capabilities = args
        .get("capabilities")
        .and_then(Value::as_array)
        .map(|caps| caps.iter().filter_map(Value::as_str).map(String::from).collect())
        .unwrap_or_default();
    if let Some(max) = args.get("max_concurrent_tasks").and_then(Value::as_u64) {
        params.max_concurrent_tasks = u32::try_from(max).unwrap_or(5);
    }
    params.numeric_code = args
        .get("numeric_code")
        .and_then(Value::as_u64)
        .and_then(|c| u8::try_from(c).ok());
    params.send_enabled = args.get("send_enabled").and_then(Value::as_bool);
    Ok(params)
}
