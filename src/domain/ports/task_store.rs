//! Port for the per-task document store.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::task::Task;

/// Keyed storage for the canonical task record.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn save(&self, task: &Task) -> DomainResult<()>;

    async fn load(&self, task_id: &str) -> DomainResult<Option<Task>>;

    async fn list(&self) -> DomainResult<Vec<Task>>;
}
