//! Workflow templates, steps, and instances.
//!
//! A workflow is a named DAG template; executing one materializes an
//! instance whose steps are dispatched through the outbox, never sent
//! directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Status of a workflow step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl Default for StepStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Status of a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Retry policy attached to a step or template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "RetryPolicy::default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "RetryPolicy::default_retry_delay")]
    pub retry_delay: u64,
    #[serde(default = "RetryPolicy::default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    fn default_max_retries() -> u32 {
        3
    }
    fn default_retry_delay() -> u64 {
        60
    }
    fn default_backoff_multiplier() -> f64 {
        2.0
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: Self::default_max_retries(),
            retry_delay: Self::default_retry_delay(),
            backoff_multiplier: Self::default_backoff_multiplier(),
        }
    }
}

/// One step of a workflow template (and, with state, of an instance).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub step_id: String,
    pub role: String,
    pub action: String,
    #[serde(default)]
    pub inputs: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_group: Option<String>,
    #[serde(default)]
    pub requires_audit_triplet: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ata_taskcode_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ata_message_kind: Option<String>,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// A named workflow template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub name: String,
    pub description: String,
    pub steps: Vec<WorkflowStep>,
    #[serde(default = "WorkflowTemplate::default_timeout")]
    pub default_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_retry_policy: Option<RetryPolicy>,
}

impl WorkflowTemplate {
    fn default_timeout() -> u64 {
        3600
    }
}

/// A running (or finished) materialization of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub instance_id: String,
    pub workflow_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub inputs: serde_json::Map<String, serde_json::Value>,
    pub status: WorkflowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub outputs: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowInstance {
    /// Instance id: `WF-{yyyymmddHHMMSS}-{8-hex of workflow name}`.
    pub fn generate_instance_id(workflow_name: &str, now: DateTime<Utc>) -> String {
        let digest = Sha256::digest(workflow_name.as_bytes());
        format!("WF-{}-{}", now.format("%Y%m%d%H%M%S"), &hex::encode(digest)[..8])
    }

    /// Steps whose dependencies are all completed and which have not yet
    /// finished or failed.
    pub fn ready_steps(&self) -> Vec<&WorkflowStep> {
        self.steps
            .iter()
            .filter(|step| {
                !matches!(step.status, StepStatus::Completed | StepStatus::Failed)
                    && step.depends_on.iter().all(|dep| {
                        self.steps
                            .iter()
                            .any(|s| s.step_id == *dep && s.status == StepStatus::Completed)
                    })
            })
            .collect()
    }

    /// Derive the instance status from step states.
    pub fn derive_status(&self) -> WorkflowStatus {
        if self.steps.iter().any(|s| s.status == StepStatus::Failed) {
            WorkflowStatus::Failed
        } else if self.steps.iter().all(|s| s.status == StepStatus::Completed) {
            WorkflowStatus::Completed
        } else {
            WorkflowStatus::Running
        }
    }

    /// Progress: same formula as task progress.
    pub fn progress(&self) -> (usize, usize, u32) {
        let total = self.steps.len();
        let completed = self.steps.iter().filter(|s| s.status == StepStatus::Completed).count();
        let pct = if total > 0 {
            u32::try_from(completed * 100 / total).unwrap_or(100)
        } else {
            0
        };
        (total, completed, pct)
    }
}

fn step(
    step_id: &str,
    role: &str,
    action: &str,
    inputs: serde_json::Value,
    outputs: &[&str],
    depends_on: &[&str],
    timeout: u64,
) -> WorkflowStep {
    let inputs = match inputs {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    WorkflowStep {
        step_id: step_id.to_string(),
        role: role.to_string(),
        action: action.to_string(),
        inputs,
        outputs: outputs.iter().map(|s| (*s).to_string()).collect(),
        depends_on: depends_on.iter().map(|s| (*s).to_string()).collect(),
        timeout,
        retry_policy: None,
        parallel_group: None,
        requires_audit_triplet: false,
        ata_taskcode_prefix: None,
        ata_message_kind: None,
        status: StepStatus::Pending,
        retry_count: 0,
        assigned_agent: None,
        result: None,
        error: None,
        started_at: None,
        completed_at: None,
    }
}

/// The seeded template set the engine ships with.
pub fn default_templates() -> Vec<WorkflowTemplate> {
    let mut research = step(
        "research",
        "quant_researcher",
        "design_strategy",
        serde_json::json!({}),
        &["strategy_design"],
        &[],
        1800,
    );
    research.retry_policy = Some(RetryPolicy { max_retries: 2, retry_delay: 60, backoff_multiplier: 2.0 });

    let quant_research_to_code = WorkflowTemplate {
        name: "quant_research_to_code".to_string(),
        description: "Research-to-implementation pipeline with a review gate".to_string(),
        steps: vec![
            research,
            step(
                "implement",
                "quant_dev_trading",
                "implement_strategy",
                serde_json::json!({"strategy_design": "${research.strategy_design}"}),
                &["code"],
                &["research"],
                3600,
            ),
            step(
                "review",
                "reviewer",
                "review_code",
                serde_json::json!({"code": "${implement.code}"}),
                &["review_report"],
                &["implement"],
                900,
            ),
        ],
        default_timeout: 3600,
        default_retry_policy: None,
    };

    let mut collab_steps = vec![
        step(
            "architect",
            "architect",
            "design_system",
            serde_json::json!({"requirement": "${workflow_inputs.requirement}"}),
            &["design_doc", "architecture_spec"],
            &[],
            3600,
        ),
        step(
            "implementer",
            "implementer",
            "implement_code",
            serde_json::json!({
                "design_doc": "${architect.design_doc}",
                "architecture_spec": "${architect.architecture_spec}",
            }),
            &["code", "implementation_report"],
            &["architect"],
            7200,
        ),
        step(
            "reviewer",
            "reviewer",
            "review_code",
            serde_json::json!({
                "code": "${implementer.code}",
                "implementation_report": "${implementer.implementation_report}",
            }),
            &["review_report", "approval_status"],
            &["implementer"],
            1800,
        ),
        step(
            "tester",
            "tester",
            "test_code",
            serde_json::json!({
                "code": "${implementer.code}",
                "review_report": "${reviewer.review_report}",
            }),
            &["test_report", "test_results"],
            &["reviewer"],
            1800,
        ),
    ];
    for (s, prefix) in collab_steps.iter_mut().zip(["ARCH", "IMPL", "REVIEW", "TEST"]) {
        s.ata_message_kind = Some("request".to_string());
        s.ata_taskcode_prefix = Some(prefix.to_string());
        s.requires_audit_triplet = true;
    }
    let multi_agent_collaboration = WorkflowTemplate {
        name: "multi_agent_collaboration".to_string(),
        description: "Architect → implementer → reviewer → tester, every step dispatched via outbox review".to_string(),
        steps: collab_steps,
        default_timeout: 14400,
        default_retry_policy: None,
    };

    let mut explore_steps: Vec<WorkflowStep> = (1..=3)
        .map(|i| {
            let design = format!("design_{i}");
            let evidence = format!("evidence_{i}");
            let mut s = step(
                &format!("arch_parallel_{i}"),
                "architect",
                &format!("explore_approach_{i}"),
                serde_json::json!({
                    "requirement": "${workflow_inputs.requirement}",
                    "approach": format!("approach_{i}"),
                }),
                &[design.as_str(), evidence.as_str()],
                &[],
                3600,
            );
            s.parallel_group = Some("exploration".to_string());
            s.ata_message_kind = Some("request".to_string());
            s.ata_taskcode_prefix = Some(format!("ARCH-PARALLEL-{i}"));
            s
        })
        .collect();
    let mut aggregate = step(
        "aggregate_decision",
        "architect",
        "aggregate_and_decide",
        serde_json::json!({
            "design_1": "${arch_parallel_1.design_1}",
            "design_2": "${arch_parallel_2.design_2}",
            "design_3": "${arch_parallel_3.design_3}",
        }),
        &["final_design", "decision_report"],
        &["arch_parallel_1", "arch_parallel_2", "arch_parallel_3"],
        1800,
    );
    aggregate.ata_message_kind = Some("request".to_string());
    aggregate.ata_taskcode_prefix = Some("AGGREGATE".to_string());
    explore_steps.push(aggregate);
    let parallel_exploration = WorkflowTemplate {
        name: "parallel_exploration".to_string(),
        description: "Three architects explore independently, then one aggregation step decides".to_string(),
        steps: explore_steps,
        default_timeout: 10800,
        default_retry_policy: None,
    };

    let mut qa_steps = vec![
        step(
            "code_review",
            "reviewer",
            "comprehensive_review",
            serde_json::json!({
                "code": "${workflow_inputs.code}",
                "context": "${workflow_inputs.context}",
            }),
            &["review_report", "issues_found", "approval_status"],
            &[],
            1800,
        ),
        step(
            "test_execution",
            "tester",
            "run_tests",
            serde_json::json!({
                "code": "${workflow_inputs.code}",
                "review_report": "${code_review.review_report}",
            }),
            &["test_report", "test_results", "coverage"],
            &["code_review"],
            3600,
        ),
        step(
            "ci_gate_check",
            "ci_complete",
            "run_ci_checks",
            serde_json::json!({
                "code": "${workflow_inputs.code}",
                "test_report": "${test_execution.test_report}",
                "review_report": "${code_review.review_report}",
            }),
            &["ci_status", "gate_result", "verdict"],
            &["test_execution"],
            1800,
        ),
    ];
    for (s, prefix) in qa_steps.iter_mut().zip(["QA-REVIEW", "QA-TEST", "QA-CI-GATE"]) {
        s.ata_message_kind = Some("request".to_string());
        s.ata_taskcode_prefix = Some(prefix.to_string());
        s.requires_audit_triplet = true;
    }
    let quality_assurance = WorkflowTemplate {
        name: "quality_assurance".to_string(),
        description: "Mandatory review → test → CI gate chain, every step carrying the evidence triplet".to_string(),
        steps: qa_steps,
        default_timeout: 7200,
        default_retry_policy: None,
    };

    vec![
        quant_research_to_code,
        multi_agent_collaboration,
        parallel_exploration,
        quality_assurance,
    ]
}
