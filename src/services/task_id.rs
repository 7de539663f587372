//! Unified task-id management.
//!
//! Generates `{AREA}-{YYYYMMDD}-{SEQ:03d}` ids from a per-date counter and
//! maintains the bidirectional taskcode mapping. Both live in the same
//! sqlite store as the message queue, so counters and mappings share its
//! durability and atomic-upsert semantics.

use chrono::Local;

use crate::adapters::sqlite::SqliteIdRepository;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::task_id::{TaskCode, TaskId};

const DEFAULT_AREA: &str = "QSYS";

#[derive(Clone)]
pub struct TaskIdManager {
    repo: SqliteIdRepository,
}

impl TaskIdManager {
    pub fn new(repo: SqliteIdRepository) -> Self {
        Self { repo }
    }

    /// Generate a new id. `date` defaults to the local date; `seq` to the
    /// next per-date counter value.
    pub async fn generate(
        &self,
        area: &str,
        date: Option<&str>,
        seq: Option<u32>,
    ) -> DomainResult<TaskId> {
        // validate before touching the counter so a bad area never burns a seq
        TaskId::validate_area(area)?;
        let date = match date {
            Some(d) => d.to_string(),
            None => Local::now().format("%Y%m%d").to_string(),
        };
        let seq = match seq {
            Some(s) => s,
            None => self.repo.next_seq(&date).await?,
        };
        TaskId::from_parts(area, &date, seq)
    }

    pub fn parse(&self, id: &str) -> Option<TaskId> {
        TaskId::parse(id)
    }

    pub fn is_valid(&self, id: &str) -> bool {
        TaskId::is_valid(id)
    }

    pub async fn register_mapping(&self, taskcode: &TaskCode, task_id: &TaskId) -> DomainResult<()> {
        self.repo.register_mapping(taskcode.as_str(), task_id.as_str()).await
    }

    pub async fn get_task_id(&self, taskcode: &str) -> DomainResult<Option<TaskId>> {
        Ok(self.repo.get_task_id(taskcode).await?.and_then(|s| TaskId::parse(&s)))
    }

    pub async fn get_taskcode(&self, task_id: &str) -> DomainResult<Option<TaskCode>> {
        Ok(self.repo.get_taskcode(task_id).await?.map(TaskCode::new))
    }

    /// Return the mapped id for a taskcode, creating one when absent.
    ///
    /// A `{AREA}__{YYYYMMDD}` code keeps its own area and date; anything
    /// else goes through `migrate_taskcode`.
    pub async fn ensure_task_id(&self, taskcode: &str, area: Option<&str>) -> DomainResult<TaskId> {
        if let Some(existing) = self.get_task_id(taskcode).await? {
            return Ok(existing);
        }

        let code = TaskCode::new(taskcode);
        if let Some((code_area, date)) = code.split_area_date() {
            let area = area.unwrap_or(code_area);
            // area charsets wider than the canonical one fall back to migration
            match self.generate(area, Some(date), None).await {
                Ok(task_id) => {
                    self.repo.register_mapping(taskcode, task_id.as_str()).await?;
                    return Ok(task_id);
                }
                Err(DomainError::InvalidArea(_)) => {}
                Err(e) => return Err(e),
            }
        }

        self.migrate_taskcode(taskcode, area.unwrap_or(DEFAULT_AREA)).await
    }

    /// Migrate a legacy taskcode: reuse any embedded 8-digit date, else
    /// today, under the given area. Persists the mapping on first creation.
    pub async fn migrate_taskcode(&self, taskcode: &str, area: &str) -> DomainResult<TaskId> {
        if let Some(existing) = self.get_task_id(taskcode).await? {
            return Ok(existing);
        }
        let code = TaskCode::new(taskcode);
        let date = code.embedded_date().map(String::from);
        let task_id = self.generate(area, date.as_deref(), None).await?;
        self.repo.register_mapping(taskcode, task_id.as_str()).await?;
        Ok(task_id)
    }

    /// Migrate a batch of taskcodes, returning (taskcode, task_id) pairs.
    pub async fn batch_migrate(
        &self,
        taskcodes: &[String],
        area: &str,
    ) -> DomainResult<Vec<(String, TaskId)>> {
        let mut out = Vec::with_capacity(taskcodes.len());
        for code in taskcodes {
            let id = self.migrate_taskcode(code, area).await?;
            out.push((code.clone(), id));
        }
        Ok(out)
    }
}
