//! Task and subtask domain models.
//!
//! A task owns an execution plan: an ordered list of subtasks forming a DAG
//! through `depends_on`. Task status is always derived from subtask states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::task_id::{TaskCode, TaskId};

/// Status of a task, derived from its subtask states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Waiting,
    Completed,
    Failed,
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "waiting" => Some(Self::Waiting),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Status of a single subtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl Default for SubtaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl SubtaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Terminal states stamp `completed_at`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

/// Priority of a subtask or message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

/// Constraints carried on a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub law_ref: Option<String>,
    #[serde(default)]
    pub allowed_paths: Vec<String>,
}

/// A single unit of work within a task's plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub subtask_id: String,
    pub task_id: String,
    pub step_id: String,
    pub role: String,
    pub action: String,
    #[serde(default)]
    pub inputs: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub priority: Priority,
    pub timeout_seconds: u64,
    #[serde(default)]
    pub status: SubtaskStatus,
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Subtask {
    /// New pending subtask with the `{task_id}-ST{NNN}` id convention.
    pub fn numbered(task_id: &TaskId, index: usize, role: impl Into<String>) -> Self {
        Self {
            subtask_id: format!("{task_id}-ST{:03}", index + 1),
            task_id: task_id.to_string(),
            step_id: format!("step_{}", index + 1),
            role: role.into(),
            action: "execute".to_string(),
            inputs: serde_json::Map::new(),
            outputs: Vec::new(),
            depends_on: Vec::new(),
            priority: Priority::Normal,
            timeout_seconds: 1800,
            status: SubtaskStatus::Pending,
            assigned_agent: None,
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
            description: None,
        }
    }
}

/// The execution plan for a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPlan {
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub dependencies: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub parallel_groups: Vec<Vec<String>>,
    #[serde(default)]
    pub estimated_duration: u64,
}

impl TaskPlan {
    /// Rebuild the dependency map and parallel groups from the subtask list.
    pub fn reindex(&mut self) {
        self.dependencies = self
            .subtasks
            .iter()
            .filter(|st| !st.depends_on.is_empty())
            .map(|st| (st.subtask_id.clone(), st.depends_on.clone()))
            .collect();

        let roots: Vec<String> = self
            .subtasks
            .iter()
            .filter(|st| st.depends_on.is_empty())
            .map(|st| st.subtask_id.clone())
            .collect();
        self.parallel_groups = if roots.len() > 1 { vec![roots] } else { Vec::new() };
    }

    /// Reject plans whose `depends_on` edges form a cycle or point nowhere.
    pub fn validate(&self) -> DomainResult<()> {
        let ids: HashSet<&str> = self.subtasks.iter().map(|st| st.subtask_id.as_str()).collect();
        for st in &self.subtasks {
            for dep in &st.depends_on {
                if dep == &st.subtask_id {
                    return Err(DomainError::ValidationFailed(format!(
                        "subtask depends on itself: {}",
                        st.subtask_id
                    )));
                }
                if !ids.contains(dep.as_str()) {
                    return Err(DomainError::ValidationFailed(format!(
                        "unknown dependency {dep} of subtask {}",
                        st.subtask_id
                    )));
                }
            }
        }

        // Kahn's algorithm: all nodes must drain, otherwise a cycle remains.
        let mut indegree: HashMap<&str, usize> =
            self.subtasks.iter().map(|st| (st.subtask_id.as_str(), st.depends_on.len())).collect();
        let mut queue: Vec<&str> = indegree
            .iter()
            .filter_map(|(id, d)| (*d == 0).then_some(*id))
            .collect();
        let mut drained = 0;
        while let Some(id) = queue.pop() {
            drained += 1;
            for st in &self.subtasks {
                if st.depends_on.iter().any(|d| d == id) {
                    let entry = indegree.get_mut(st.subtask_id.as_str()).expect("indexed");
                    *entry -= 1;
                    if *entry == 0 {
                        queue.push(st.subtask_id.as_str());
                    }
                }
            }
        }
        if drained != self.subtasks.len() {
            return Err(DomainError::ValidationFailed(
                "dependency cycle in subtask plan".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether every dependency of the given subtask is completed.
    pub fn deps_met(&self, subtask: &Subtask) -> bool {
        subtask.depends_on.iter().all(|dep| {
            self.subtasks
                .iter()
                .any(|st| st.subtask_id == *dep && st.status == SubtaskStatus::Completed)
        })
    }
}

/// Progress summary of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
    pub percentage: u32,
}

/// The canonical task record persisted per task_id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub task_code: TaskCode,
    pub goal: String,
    #[serde(default)]
    pub constraints: TaskConstraints,
    #[serde(default)]
    pub acceptance: Vec<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub plan: TaskPlan,
}

impl Task {
    pub fn new(task_id: TaskId, task_code: TaskCode, goal: impl Into<String>, created_by: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            task_code,
            goal: goal.into(),
            constraints: TaskConstraints::default(),
            acceptance: Vec::new(),
            status: TaskStatus::Pending,
            priority: Priority::Normal,
            timeout_seconds: None,
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
            plan: TaskPlan::default(),
        }
    }

    /// Derive the task status from subtask states.
    ///
    /// Failed beats everything, then all-completed, then any-running, then
    /// pending-with-unmet-deps (waiting); an empty plan stays pending.
    pub fn derive_status(&self) -> TaskStatus {
        let subtasks = &self.plan.subtasks;
        if subtasks.is_empty() {
            return TaskStatus::Pending;
        }
        if subtasks.iter().any(|st| st.status == SubtaskStatus::Failed) {
            return TaskStatus::Failed;
        }
        if subtasks.iter().all(|st| st.status == SubtaskStatus::Completed) {
            return TaskStatus::Completed;
        }
        if subtasks.iter().any(|st| st.status == SubtaskStatus::Running) {
            return TaskStatus::Running;
        }
        let blocked_pending = subtasks.iter().any(|st| {
            st.status == SubtaskStatus::Pending && !self.plan.deps_met(st)
        });
        if blocked_pending {
            return TaskStatus::Waiting;
        }
        if subtasks.iter().any(|st| st.status == SubtaskStatus::Pending) {
            // All pending subtasks are unblocked
            return TaskStatus::Pending;
        }
        TaskStatus::Pending
    }

    /// Apply the derived status and bump `updated_at`.
    pub fn recompute_status(&mut self) {
        self.status = self.derive_status();
        self.updated_at = Utc::now();
    }

    pub fn progress(&self) -> TaskProgress {
        let total = self.plan.subtasks.len();
        let completed = self
            .plan
            .subtasks
            .iter()
            .filter(|st| st.status == SubtaskStatus::Completed)
            .count();
        let failed = self
            .plan
            .subtasks
            .iter()
            .filter(|st| st.status == SubtaskStatus::Failed)
            .count();
        let percentage = if total > 0 {
            u32::try_from(completed * 100 / total).unwrap_or(100)
        } else {
            0
        };
        TaskProgress {
            total,
            completed,
            failed,
            pending: total - completed - failed,
            percentage,
        }
    }

    pub fn find_subtask_mut(&mut self, subtask_id: &str) -> Option<&mut Subtask> {
        self.plan.subtasks.iter_mut().find(|st| st.subtask_id == subtask_id)
    }

    pub fn has_subtask(&self, subtask_id: &str) -> bool {
        self.plan.subtasks.iter().any(|st| st.subtask_id == subtask_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with_statuses(statuses: &[SubtaskStatus]) -> Task {
        let id = TaskId::from_parts("TEST", "20260101", 1).unwrap();
        let mut task = Task::new(id.clone(), TaskCode::new("TEST__20260101"), "goal", "tests");
        for (i, status) in statuses.iter().enumerate() {
            let mut st = Subtask::numbered(&id, i, "implementer");
            st.status = *status;
            task.plan.subtasks.push(st);
        }
        task
    }

    #[test]
    fn test_status_all_completed() {
        let task = task_with_statuses(&[SubtaskStatus::Completed, SubtaskStatus::Completed]);
        assert_eq!(task.derive_status(), TaskStatus::Completed);
    }

    #[test]
    fn test_status_any_failed_wins() {
        let task = task_with_statuses(&[SubtaskStatus::Completed, SubtaskStatus::Failed, SubtaskStatus::Running]);
        assert_eq!(task.derive_status(), TaskStatus::Failed);
    }

    #[test]
    fn test_status_any_running() {
        let task = task_with_statuses(&[SubtaskStatus::Completed, SubtaskStatus::Running]);
        assert_eq!(task.derive_status(), TaskStatus::Running);
    }

    #[test]
    fn test_status_waiting_on_unmet_deps() {
        let mut task = task_with_statuses(&[SubtaskStatus::Running, SubtaskStatus::Pending]);
        // second depends on first, which is not completed
        let first = task.plan.subtasks[0].subtask_id.clone();
        task.plan.subtasks[1].depends_on.push(first);
        // any running wins over waiting
        assert_eq!(task.derive_status(), TaskStatus::Running);

        task.plan.subtasks[0].status = SubtaskStatus::Skipped;
        assert_eq!(task.derive_status(), TaskStatus::Waiting);
    }

    #[test]
    fn test_status_empty_plan_pending() {
        let task = task_with_statuses(&[]);
        assert_eq!(task.derive_status(), TaskStatus::Pending);
    }

    #[test]
    fn test_progress_percentage_floor() {
        let task = task_with_statuses(&[
            SubtaskStatus::Completed,
            SubtaskStatus::Pending,
            SubtaskStatus::Pending,
        ]);
        let p = task.progress();
        assert_eq!(p.total, 3);
        assert_eq!(p.completed, 1);
        assert_eq!(p.pending, 2);
        assert_eq!(p.percentage, 33);
    }

    #[test]
    fn test_plan_cycle_detected() {
        let mut task = task_with_statuses(&[SubtaskStatus::Pending, SubtaskStatus::Pending]);
        let a = task.plan.subtasks[0].subtask_id.clone();
        let b = task.plan.subtasks[1].subtask_id.clone();
        task.plan.subtasks[0].depends_on.push(b);
        task.plan.subtasks[1].depends_on.push(a);
        assert!(task.plan.validate().is_err());
    }

    #[test]
    fn test_plan_self_dependency_rejected() {
        let mut task = task_with_statuses(&[SubtaskStatus::Pending]);
        let a = task.plan.subtasks[0].subtask_id.clone();
        task.plan.subtasks[0].depends_on.push(a);
        assert!(task.plan.validate().is_err());
    }

    #[test]
    fn test_plan_reindex_groups_roots() {
        let mut task = task_with_statuses(&[
            SubtaskStatus::Pending,
            SubtaskStatus::Pending,
            SubtaskStatus::Pending,
        ]);
        let a = task.plan.subtasks[0].subtask_id.clone();
        task.plan.subtasks[2].depends_on.push(a);
        task.plan.reindex();
        assert_eq!(task.plan.parallel_groups.len(), 1);
        assert_eq!(task.plan.parallel_groups[0].len(), 2);
        assert_eq!(task.plan.dependencies.len(), 1);
    }
}
