//! CI verdict processing.
//!
//! Reads a verdict artifact, normalizes it, publishes `VerdictGenerated`,
//! and on failure appends one repair subtask per fail code to the original
//! task's plan.

use std::path::Path;
use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::verdict::{Verdict, VerdictStatus};
use crate::services::event_publisher::EventPublisher;
use crate::services::orchestrator::TaskOrchestrator;
use crate::services::task_id::TaskIdManager;

/// Outcome of processing a verdict.
#[derive(Debug, Clone)]
pub struct VerdictOutcome {
    pub task_id: String,
    pub status: VerdictStatus,
    pub fail_codes: Vec<String>,
    pub repair_subtasks_created: bool,
}

pub struct VerdictHandler {
    publisher: EventPublisher,
    orchestrator: Arc<TaskOrchestrator>,
    task_ids: TaskIdManager,
}

impl VerdictHandler {
    pub fn new(
        publisher: EventPublisher,
        orchestrator: Arc<TaskOrchestrator>,
        task_ids: TaskIdManager,
    ) -> Self {
        Self { publisher, orchestrator, task_ids }
    }

    /// Process a verdict file on disk.
    pub async fn process_verdict_file(&self, path: &Path) -> DomainResult<VerdictOutcome> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DomainError::VerdictParse(format!("cannot read verdict: {e}")))?;
        let raw: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| DomainError::VerdictParse(format!("malformed verdict JSON: {e}")))?;
        self.process_verdict(raw).await
    }

    /// Process an already-loaded verdict document.
    pub async fn process_verdict(&self, raw: serde_json::Value) -> DomainResult<VerdictOutcome> {
        let verdict = Verdict::from_json(raw);

        let Some(task_code) = verdict.task_code.as_deref() else {
            return Err(DomainError::VerdictParse(
                "Cannot determine task_id from verdict".to_string(),
            ));
        };
        let task_id = match self.task_ids.get_task_id(task_code).await? {
            Some(id) => id,
            None => self.task_ids.ensure_task_id(task_code, None).await?,
        };

        self.publisher
            .publish_verdict(
                task_id.as_str(),
                verdict.task_code.as_deref(),
                verdict.status.as_str(),
                &verdict.fail_codes,
                verdict.raw.clone(),
            )
            .await?;

        let mut repair_subtasks_created = false;
        if verdict.status == VerdictStatus::Fail && !verdict.fail_codes.is_empty() {
            let added = self
                .orchestrator
                .append_repair_subtasks(task_id.as_str(), &verdict.fail_codes, &verdict.raw)
                .await?;
            repair_subtasks_created = !added.is_empty();
        }

        Ok(VerdictOutcome {
            task_id: task_id.to_string(),
            status: verdict.status,
            fail_codes: verdict.fail_codes,
            repair_subtasks_created,
        })
    }
}
