//! Workflow engine: executes named DAG templates.
//!
//! Every step becomes an outbox send-request — the engine never sends
//! directly. A successful enqueue marks the step's external dispatch
//! complete; the step itself stays RUNNING until the orchestrator reports
//! a response and calls `complete_step`.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::message::MessageKind;
use crate::domain::models::task::Priority;
use crate::domain::models::workflow::{
    default_templates, StepStatus, WorkflowInstance, WorkflowStatus, WorkflowTemplate,
};
use crate::services::coordinator::AgentCoordinator;
use crate::services::outbox::OutboxService;

/// The agent identity the engine submits outbox requests under. It must be
/// registered and send-enabled like any other sender.
pub const ENGINE_AGENT_ID: &str = "workflow_engine";

/// Summary returned from `execute_workflow`.
#[derive(Debug, Clone)]
pub struct StartedWorkflow {
    pub instance_id: String,
    pub workflow_name: String,
    pub status: WorkflowStatus,
    pub steps_count: usize,
}

pub struct WorkflowEngine {
    templates_file: PathBuf,
    instances_dir: PathBuf,
    templates: RwLock<Vec<WorkflowTemplate>>,
    coordinator: Arc<AgentCoordinator>,
    outbox: Arc<OutboxService>,
}

impl WorkflowEngine {
    /// Open the engine, seeding the template file with the default set when
    /// absent.
    pub async fn open(
        templates_file: impl Into<PathBuf>,
        instances_dir: impl Into<PathBuf>,
        coordinator: Arc<AgentCoordinator>,
        outbox: Arc<OutboxService>,
    ) -> DomainResult<Self> {
        let templates_file = templates_file.into();
        let templates = match tokio::fs::read_to_string(&templates_file).await {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let seeded = default_templates();
                if let Some(parent) = templates_file.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&templates_file, serde_json::to_string_pretty(&seeded)?).await?;
                seeded
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            templates_file,
            instances_dir: instances_dir.into(),
            templates: RwLock::new(templates),
            coordinator,
            outbox,
        })
    }

    pub async fn list_templates(&self) -> Vec<String> {
        self.templates.read().await.iter().map(|t| t.name.clone()).collect()
    }

    pub async fn get_template(&self, name: &str) -> Option<WorkflowTemplate> {
        self.templates.read().await.iter().find(|t| t.name == name).cloned()
    }

    pub async fn register_template(&self, template: WorkflowTemplate) -> DomainResult<()> {
        let mut templates = self.templates.write().await;
        templates.retain(|t| t.name != template.name);
        templates.push(template);
        tokio::fs::write(&self.templates_file, serde_json::to_string_pretty(&*templates)?).await?;
        Ok(())
    }

    /// Materialize and start a workflow instance.
    pub async fn execute_workflow(
        &self,
        workflow_name: &str,
        inputs: serde_json::Map<String, serde_json::Value>,
        task_id: Option<String>,
    ) -> DomainResult<StartedWorkflow> {
        let template = self
            .get_template(workflow_name)
            .await
            .ok_or_else(|| DomainError::WorkflowTemplateNotFound(workflow_name.to_string()))?;

        let now = Utc::now();
        let mut instance = WorkflowInstance {
            instance_id: WorkflowInstance::generate_instance_id(workflow_name, now),
            workflow_name: workflow_name.to_string(),
            task_id,
            inputs: inputs.clone(),
            status: WorkflowStatus::Pending,
            current_step: None,
            steps: template.steps.clone(),
            outputs: serde_json::Map::new(),
            created_at: now,
            started_at: None,
            completed_at: None,
        };
        for step in &mut instance.steps {
            if step.retry_policy.is_none() {
                step.retry_policy.clone_from(&template.default_retry_policy);
            }
        }

        instance.status = WorkflowStatus::Running;
        instance.started_at = Some(now);

        let ready_ids: Vec<String> =
            instance.ready_steps().iter().map(|s| s.step_id.clone()).collect();
        if let Some(first) = ready_ids.first() {
            instance.current_step = Some(first.clone());
            self.dispatch_step(&mut instance, first).await;
        }

        let summary = StartedWorkflow {
            instance_id: instance.instance_id.clone(),
            workflow_name: instance.workflow_name.clone(),
            status: instance.status,
            steps_count: instance.steps.len(),
        };
        self.save_instance(&instance).await?;
        Ok(summary)
    }

    /// Mark a step completed with its result, resolve outputs, and dispatch
    /// the next ready step. Called by the orchestrator when the step's
    /// response message arrives.
    pub async fn complete_step(
        &self,
        instance_id: &str,
        step_id: &str,
        result: serde_json::Value,
    ) -> DomainResult<WorkflowInstance> {
        let mut instance = self.load_instance(instance_id).await?;
        {
            let step = instance
                .steps
                .iter_mut()
                .find(|s| s.step_id == step_id)
                .ok_or_else(|| {
                    DomainError::ValidationFailed(format!("unknown step: {step_id}"))
                })?;
            step.status = StepStatus::Completed;
            step.completed_at = Some(Utc::now());
            step.result = Some(result.clone());
            for output_key in step.outputs.clone() {
                let value = result.get(&output_key).cloned().unwrap_or(result.clone());
                instance.outputs.insert(output_key, value);
            }
        }

        instance.status = instance.derive_status();
        if instance.status == WorkflowStatus::Completed {
            instance.completed_at = Some(Utc::now());
            instance.current_step = None;
        } else {
            let ready_ids: Vec<String> = instance
                .ready_steps()
                .iter()
                .filter(|s| s.status == StepStatus::Pending)
                .map(|s| s.step_id.clone())
                .collect();
            if let Some(next) = ready_ids.first() {
                instance.current_step = Some(next.clone());
                self.dispatch_step(&mut instance, next).await;
            }
        }

        self.save_instance(&instance).await?;
        Ok(instance)
    }

    pub async fn get_instance(&self, instance_id: &str) -> DomainResult<WorkflowInstance> {
        self.load_instance(instance_id).await
    }

    pub async fn all_instances(&self) -> DomainResult<Vec<WorkflowInstance>> {
        let mut instances = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.instances_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(instances),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = tokio::fs::read_to_string(entry.path()).await?;
            if let Ok(instance) = serde_json::from_str::<WorkflowInstance>(&content) {
                instances.push(instance);
            }
        }
        instances.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(instances)
    }

    /// Dispatch a step through the outbox. On failure the step and the
    /// instance are marked FAILED; on success the step stays RUNNING with a
    /// `pending_review` result.
    async fn dispatch_step(&self, instance: &mut WorkflowInstance, step_id: &str) {
        let Some(idx) = instance.steps.iter().position(|s| s.step_id == step_id) else {
            return;
        };

        let resolved_inputs = {
            let step = &instance.steps[idx];
            resolve_inputs(&step.inputs, &instance.inputs, &instance.outputs)
        };
        instance.steps[idx].inputs.clone_from(&resolved_inputs);
        instance.steps[idx].status = StepStatus::Running;
        instance.steps[idx].started_at = Some(Utc::now());

        let role = instance.steps[idx].role.clone();
        let Some(agent) = self.coordinator.find_agent_for_role(&role, None, true).await else {
            instance.steps[idx].status = StepStatus::Failed;
            instance.steps[idx].error = Some(format!("No available agent found for role: {role}"));
            instance.steps[idx].completed_at = Some(Utc::now());
            instance.status = WorkflowStatus::Failed;
            return;
        };
        instance.steps[idx].assigned_agent = Some(agent.agent_id.clone());

        let step = instance.steps[idx].clone();
        let prefix = step
            .ata_taskcode_prefix
            .clone()
            .unwrap_or_else(|| step.step_id.to_uppercase());
        let taskcode = format!("{prefix}-{}", &instance.instance_id[..8.min(instance.instance_id.len())]);
        let date_str = Utc::now().format("%Y%m%d").to_string();

        let (report_path, selftest_log_path, evidence_dir) = if step.requires_audit_triplet {
            (
                Some(format!("docs/REPORT/ata/REPORT__{taskcode}__{date_str}.md")),
                Some(format!("docs/REPORT/ata/artifacts/{taskcode}/selftest.log")),
                Some(format!("docs/REPORT/ata/artifacts/{taskcode}/")),
            )
        } else {
            (None, None, None)
        };

        let to_display = agent.display_name();
        let mut text = format!(
            "@{to_display} 【工作流步骤】{}: {}\n\n",
            step.step_id, step.action
        );
        text.push_str(&format!("工作流: {}\n", instance.workflow_name));
        text.push_str(&format!("实例ID: {}\n", instance.instance_id));
        text.push_str(&format!(
            "步骤输入: {}\n",
            serde_json::to_string_pretty(&resolved_inputs).unwrap_or_default()
        ));
        if step.requires_audit_triplet {
            text.push_str("\n【强制要求】本步骤必须附带三件套：\n");
            text.push_str(&format!("- REPORT: {}\n", report_path.as_deref().unwrap_or_default()));
            text.push_str(&format!(
                "- selftest.log: {}\n",
                selftest_log_path.as_deref().unwrap_or_default()
            ));
            text.push_str(&format!("- artifacts: {}\n", evidence_dir.as_deref().unwrap_or_default()));
        }

        let mut payload = serde_json::Map::new();
        payload.insert("message".to_string(), serde_json::json!(text));
        payload.insert("text".to_string(), serde_json::json!(text));
        payload.insert(
            "workflow_instance_id".to_string(),
            serde_json::json!(instance.instance_id),
        );
        payload.insert("workflow_name".to_string(), serde_json::json!(instance.workflow_name));
        payload.insert("step_id".to_string(), serde_json::json!(step.step_id));
        payload.insert("step_action".to_string(), serde_json::json!(step.action));
        payload.insert(
            "step_inputs".to_string(),
            serde_json::Value::Object(resolved_inputs),
        );
        payload.insert("to_display".to_string(), serde_json::json!(to_display));
        payload.insert("ata_comm_rule".to_string(), serde_json::json!("name_with_code_v1"));

        let kind = step
            .ata_message_kind
            .as_deref()
            .and_then(MessageKind::from_str)
            .unwrap_or(MessageKind::Request);

        let request = self
            .outbox
            .send_request(
                &taskcode,
                ENGINE_AGENT_ID,
                &agent.agent_id,
                kind,
                payload,
                Priority::Normal,
                true,
                None,
                report_path,
                selftest_log_path,
                evidence_dir,
                ENGINE_AGENT_ID,
            )
            .await;

        match request {
            Ok(req) => {
                instance.steps[idx].result = Some(serde_json::json!({
                    "status": "pending_review",
                    "request_id": req.request_id,
                    "message": "Step queued for admin review via ATA outbox",
                }));
            }
            Err(e) => {
                instance.steps[idx].status = StepStatus::Failed;
                instance.steps[idx].error = Some(e.to_string());
                instance.steps[idx].completed_at = Some(Utc::now());
                instance.status = WorkflowStatus::Failed;
            }
        }
    }

    async fn save_instance(&self, instance: &WorkflowInstance) -> DomainResult<()> {
        tokio::fs::create_dir_all(&self.instances_dir).await?;
        let path = self.instances_dir.join(format!("{}.json", instance.instance_id));
        tokio::fs::write(path, serde_json::to_string_pretty(instance)?).await?;
        Ok(())
    }

    async fn load_instance(&self, instance_id: &str) -> DomainResult<WorkflowInstance> {
        let path = self.instances_dir.join(format!("{instance_id}.json"));
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                DomainError::ValidationFailed(format!("Workflow instance {instance_id} not found")),
            ),
            Err(e) => Err(e.into()),
        }
    }
}

/// Resolve `${ref}` input values against workflow inputs and prior step
/// outputs. `${a.b}` looks up `b`; a bare `${x}` looks up `x`; anything
/// unresolved stays as-is.
fn resolve_inputs(
    template: &serde_json::Map<String, serde_json::Value>,
    workflow_inputs: &serde_json::Map<String, serde_json::Value>,
    step_outputs: &serde_json::Map<String, serde_json::Value>,
) -> serde_json::Map<String, serde_json::Value> {
    let mut resolved = serde_json::Map::new();
    for (key, value) in template {
        let new_value = match value.as_str() {
            Some(s) if s.starts_with("${") && s.ends_with('}') => {
                let reference = &s[2..s.len() - 1];
                let lookup_key = reference.rsplit('.').next().unwrap_or(reference);
                step_outputs
                    .get(lookup_key)
                    .or_else(|| workflow_inputs.get(lookup_key))
                    .cloned()
                    .unwrap_or_else(|| value.clone())
            }
            _ => value.clone(),
        };
        resolved.insert(key.clone(), new_value);
    }
    resolved
}
