//! Task orchestration: analyze a goal into roles, decompose into a subtask
//! DAG, track per-subtask state, derive task status.

use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::task::{
    Priority, Subtask, SubtaskStatus, Task, TaskPlan, TaskProgress, TaskStatus,
};
use crate::domain::models::task_id::{TaskCode, TaskId};
use crate::domain::models::workflow::WorkflowTemplate;
use crate::domain::ports::TaskStore;
use crate::services::event_publisher::EventPublisher;
use crate::services::task_id::TaskIdManager;

const ORCH_AREA: &str = "ORCH";
const SECONDS_PER_ROLE: u64 = 30 * 60;

/// Result of analyzing a task description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskAnalysis {
    pub required_roles: Vec<String>,
    pub complexity: Complexity,
    pub estimated_duration: u64,
    pub can_parallelize: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
        }
    }
}

/// Keyword → role table used by the analyzer.
fn role_keywords() -> Vec<(&'static str, Vec<&'static str>)> {
    vec![
        ("quant_researcher", vec!["research", "alpha", "signal", "strategy", "model", "回测"]),
        ("quant_dev_trading", vec!["implement", "code", "backtest", "optimize", "实现", "代码"]),
        ("quant_dev_infra", vec!["pipeline", "data", "infrastructure", "api", "管道", "数据"]),
        ("quant_trader", vec!["trade", "execute", "monitor", "risk", "交易", "执行"]),
        ("risk_manager", vec!["risk", "limit", "compliance", "压力测试", "风险"]),
        ("architect", vec!["design", "architecture", "system", "设计", "架构"]),
        ("backend_dev", vec!["api", "backend", "service", "database", "后端"]),
        ("frontend_dev", vec!["ui", "frontend", "interface", "前端", "界面"]),
        ("devops", vec!["ci/cd", "deploy", "infrastructure", "监控", "部署"]),
        ("data_engineer", vec!["etl", "data pipeline", "warehouse", "数据", "管道"]),
        ("reviewer", vec!["review", "code review", "审查", "代码审查"]),
        ("tester", vec!["test", "qa", "quality", "测试", "质量"]),
    ]
}

/// Infer required roles from the description text.
pub fn analyze_description(description: &str) -> TaskAnalysis {
    let text = description.to_lowercase();
    let mut required_roles = Vec::new();
    for (role, keywords) in role_keywords() {
        if keywords.iter().any(|kw| text.contains(kw)) {
            required_roles.push(role.to_string());
        }
    }
    if required_roles.is_empty() {
        required_roles.push("implementer".to_string());
    }

    let complexity = match required_roles.len() {
        0 | 1 => Complexity::Simple,
        2 => Complexity::Medium,
        _ => Complexity::Complex,
    };
    let estimated_duration = SECONDS_PER_ROLE * required_roles.len() as u64;
    let can_parallelize = required_roles.len() > 1;

    TaskAnalysis { required_roles, complexity, estimated_duration, can_parallelize }
}

/// Parameters for creating an orchestrated task.
#[derive(Debug, Clone)]
pub struct CreateTask {
    pub description: String,
    pub workflow_template: Option<String>,
    pub priority: Priority,
    pub timeout_seconds: Option<u64>,
    pub required_roles: Option<Vec<String>>,
    pub task_code: Option<String>,
    pub created_by: String,
}

impl CreateTask {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            workflow_template: None,
            priority: Priority::Normal,
            timeout_seconds: None,
            required_roles: None,
            task_code: None,
            created_by: "orchestrator".to_string(),
        }
    }
}

/// Summary returned from `create_task`.
#[derive(Debug, Clone)]
pub struct CreatedTask {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub subtasks_count: usize,
    pub estimated_duration: u64,
    pub can_parallelize: bool,
}

pub struct TaskOrchestrator {
    store: Arc<dyn TaskStore>,
    task_ids: TaskIdManager,
    publisher: EventPublisher,
    templates: Vec<WorkflowTemplate>,
}

impl TaskOrchestrator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        task_ids: TaskIdManager,
        publisher: EventPublisher,
        templates: Vec<WorkflowTemplate>,
    ) -> Self {
        Self { store, task_ids, publisher, templates }
    }

    /// Analyze, decompose, persist, and announce a new task.
    pub async fn create_task(&self, params: CreateTask) -> DomainResult<CreatedTask> {
        let mut analysis = analyze_description(&params.description);
        if let Some(roles) = &params.required_roles {
            analysis.required_roles.clone_from(roles);
        }

        let task_id = self.task_ids.generate(ORCH_AREA, None, None).await?;
        let task_code = match &params.task_code {
            Some(code) => {
                self.task_ids
                    .register_mapping(&TaskCode::new(code.clone()), &task_id)
                    .await?;
                TaskCode::new(code.clone())
            }
            None => TaskCode::new(task_id.as_str()),
        };

        let subtasks = match &params.workflow_template {
            Some(name) => {
                let template = self
                    .templates
                    .iter()
                    .find(|t| t.name == *name)
                    .ok_or_else(|| DomainError::WorkflowTemplateNotFound(name.clone()))?;
                decompose_from_template(&task_id, template)
            }
            None => decompose_by_roles(&task_id, &analysis.required_roles),
        };

        let mut plan = TaskPlan {
            subtasks,
            dependencies: std::collections::HashMap::new(),
            parallel_groups: Vec::new(),
            estimated_duration: analysis.estimated_duration,
        };
        plan.reindex();
        plan.validate()?;

        let mut task = Task::new(task_id.clone(), task_code.clone(), &params.description, &params.created_by);
        task.priority = params.priority;
        task.timeout_seconds = params.timeout_seconds.or(Some(analysis.estimated_duration));
        task.plan = plan;
        self.store.save(&task).await?;

        self.publisher
            .publish_task_created(
                task_id.as_str(),
                task_code.as_str(),
                "orchestrator",
                serde_json::to_value(&task)?,
            )
            .await?;

        Ok(CreatedTask {
            task_id,
            status: task.status,
            subtasks_count: task.plan.subtasks.len(),
            estimated_duration: analysis.estimated_duration,
            can_parallelize: analysis.can_parallelize,
        })
    }

    pub async fn get_task(&self, task_id: &str) -> DomainResult<Task> {
        self.store
            .load(task_id)
            .await?
            .ok_or_else(|| DomainError::TaskNotFound(task_id.to_string()))
    }

    pub async fn get_progress(&self, task_id: &str) -> DomainResult<TaskProgress> {
        Ok(self.get_task(task_id).await?.progress())
    }

    /// Persist a task document as-is.
    pub async fn save_task(&self, task: &Task) -> DomainResult<()> {
        self.store.save(task).await
    }

    /// Record a task document created elsewhere (e.g. by the ingress
    /// bridge) if absent, then move it to RUNNING.
    pub async fn adopt_task(&self, task: Task) -> DomainResult<Task> {
        let mut task = match self.store.load(task.task_id.as_str()).await? {
            Some(existing) => existing,
            None => task,
        };
        if task.status == TaskStatus::Pending {
            task.status = TaskStatus::Running;
            task.updated_at = chrono::Utc::now();
        }
        self.store.save(&task).await?;
        Ok(task)
    }

    /// Apply a status update to one subtask and re-derive the task status.
    /// Publishes `SubtaskCompleted` for completions, `TaskUpdated` otherwise.
    pub async fn update_subtask_status(
        &self,
        task_id: &str,
        subtask_id: &str,
        status: SubtaskStatus,
        assigned_agent: Option<String>,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> DomainResult<Task> {
        let mut task = self.get_task(task_id).await?;
        {
            let subtask = task
                .find_subtask_mut(subtask_id)
                .ok_or_else(|| DomainError::TaskNotFound(format!("{task_id}/{subtask_id}")))?;
            subtask.status = status;
            if let Some(agent) = assigned_agent {
                subtask.assigned_agent = Some(agent);
            }
            if let Some(result) = result.clone() {
                subtask.result = Some(result);
            }
            if let Some(error) = error {
                subtask.error = Some(error);
            }
            let now = chrono::Utc::now();
            if status == SubtaskStatus::Running {
                subtask.started_at = Some(now);
            } else if status.is_terminal() {
                subtask.completed_at = Some(now);
            }
        }
        task.recompute_status();
        self.store.save(&task).await?;

        if status == SubtaskStatus::Completed {
            self.publisher
                .publish_subtask_completed(
                    task_id,
                    subtask_id,
                    "orchestrator",
                    result.unwrap_or(serde_json::Value::Null),
                )
                .await?;
        } else {
            self.publisher
                .publish_task_updated(
                    task_id,
                    "orchestrator",
                    serde_json::json!({
                        "subtask_id": subtask_id,
                        "status": status.as_str(),
                        "task_status": task.status.as_str(),
                    }),
                )
                .await?;
        }
        Ok(task)
    }

    /// Append repair subtasks for the given fail codes, skipping any that
    /// already exist. Returns the subtasks actually added.
    pub async fn append_repair_subtasks(
        &self,
        task_id: &str,
        fail_codes: &[String],
        verdict_data: &serde_json::Value,
    ) -> DomainResult<Vec<Subtask>> {
        let mut task = self.get_task(task_id).await?;
        let existing: HashSet<String> =
            task.plan.subtasks.iter().map(|st| st.subtask_id.clone()).collect();

        let mut added = Vec::new();
        for fail_code in fail_codes {
            let subtask_id = format!("{task_id}-REPAIR-{fail_code}");
            if existing.contains(&subtask_id) {
                continue;
            }
            let mut inputs = serde_json::Map::new();
            inputs.insert("fail_code".to_string(), serde_json::json!(fail_code));
            inputs.insert("verdict_data".to_string(), verdict_data.clone());
            let subtask = Subtask {
                subtask_id,
                task_id: task_id.to_string(),
                step_id: format!("REPAIR-{fail_code}"),
                role: "quant_dev_infra".to_string(),
                action: "fix".to_string(),
                inputs,
                outputs: vec![format!("修复 {fail_code} 问题"), "更新任务状态".to_string()],
                depends_on: Vec::new(),
                priority: Priority::High,
                timeout_seconds: 3600,
                status: SubtaskStatus::Pending,
                assigned_agent: None,
                result: None,
                error: None,
                started_at: None,
                completed_at: None,
                description: Some(crate::domain::models::verdict::repair_description(fail_code)),
            };
            task.plan.subtasks.push(subtask.clone());
            added.push(subtask);
        }

        if !added.is_empty() {
            task.plan.reindex();
            task.recompute_status();
            self.store.save(&task).await?;
            for subtask in &added {
                self.publisher
                    .publish_event(&crate::domain::models::event::Event::subtask_created(
                        task_id,
                        serde_json::to_value(subtask)?,
                        "verdict_fail_repair",
                        "verdict_handler",
                    ))
                    .await?;
            }
        }
        Ok(added)
    }

    pub async fn all_tasks(&self) -> DomainResult<Vec<Task>> {
        self.store.list().await
    }
}

fn decompose_by_roles(task_id: &TaskId, roles: &[String]) -> Vec<Subtask> {
    roles
        .iter()
        .enumerate()
        .map(|(i, role)| Subtask::numbered(task_id, i, role.clone()))
        .collect()
}

fn decompose_from_template(task_id: &TaskId, template: &WorkflowTemplate) -> Vec<Subtask> {
    // step_id → subtask_id so depends_on edges stay within the plan
    let index_of = |step_id: &str| {
        template
            .steps
            .iter()
            .position(|s| s.step_id == step_id)
    };
    template
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let mut st = Subtask::numbered(task_id, i, step.role.clone());
            st.step_id.clone_from(&step.step_id);
            st.action.clone_from(&step.action);
            st.inputs.clone_from(&step.inputs);
            st.outputs.clone_from(&step.outputs);
            st.depends_on = step
                .depends_on
                .iter()
                .filter_map(|dep| index_of(dep))
                .map(|idx| format!("{task_id}-ST{:03}", idx + 1))
                .collect();
            st.timeout_seconds = step.timeout;
            st
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_single_role() {
        let analysis = analyze_description("please review the module");
        assert_eq!(analysis.required_roles, vec!["reviewer"]);
        assert_eq!(analysis.complexity, Complexity::Simple);
        assert_eq!(analysis.estimated_duration, 1800);
        assert!(!analysis.can_parallelize);
    }

    #[test]
    fn test_analyze_multi_role_complexity() {
        let analysis = analyze_description("design the system, implement code, and run tests");
        assert!(analysis.required_roles.len() > 2);
        assert_eq!(analysis.complexity, Complexity::Complex);
        assert!(analysis.can_parallelize);
        assert_eq!(
            analysis.estimated_duration,
            1800 * analysis.required_roles.len() as u64
        );
    }

    #[test]
    fn test_analyze_default_role() {
        let analysis = analyze_description("zzz");
        assert_eq!(analysis.required_roles, vec!["implementer"]);
    }

    #[test]
    fn test_decompose_from_template_maps_deps() {
        let task_id = TaskId::from_parts("ORCH", "20260101", 1).unwrap();
        let templates = crate::domain::models::workflow::default_templates();
        let collab = templates
            .iter()
            .find(|t| t.name == "multi_agent_collaboration")
            .unwrap();
        let subtasks = decompose_from_template(&task_id, collab);
        assert_eq!(subtasks.len(), 4);
        assert_eq!(subtasks[0].subtask_id, "ORCH-20260101-001-ST001");
        assert!(subtasks[0].depends_on.is_empty());
        assert_eq!(subtasks[1].depends_on, vec!["ORCH-20260101-001-ST001"]);
        assert_eq!(subtasks[3].step_id, "tester");
    }
}
