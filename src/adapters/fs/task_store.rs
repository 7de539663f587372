//! Filesystem task-document store: one JSON file per task_id.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::task::Task;
use crate::domain::ports::TaskStore;

#[derive(Clone)]
pub struct FsTaskStore {
    tasks_dir: PathBuf,
}

impl FsTaskStore {
    pub fn new(tasks_dir: impl Into<PathBuf>) -> Self {
        Self { tasks_dir: tasks_dir.into() }
    }

    fn path_for(&self, task_id: &str) -> PathBuf {
        self.tasks_dir.join(format!("{task_id}.json"))
    }
}

#[async_trait]
impl TaskStore for FsTaskStore {
    async fn save(&self, task: &Task) -> DomainResult<()> {
        tokio::fs::create_dir_all(&self.tasks_dir).await?;
        let json = serde_json::to_string_pretty(task)?;
        tokio::fs::write(self.path_for(task.task_id.as_str()), json).await?;
        Ok(())
    }

    async fn load(&self, task_id: &str) -> DomainResult<Option<Task>> {
        match tokio::fs::read_to_string(self.path_for(task_id)).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DomainError::Io(e.to_string())),
        }
    }

    async fn list(&self) -> DomainResult<Vec<Task>> {
        let mut tasks = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.tasks_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(tasks),
            Err(e) => return Err(DomainError::Io(e.to_string())),
        };
        while let Some(entry) = dir.next_entry().await? {
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = tokio::fs::read_to_string(entry.path()).await?;
            if let Ok(task) = serde_json::from_str::<Task>(&content) {
                tasks.push(task);
            }
        }
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::task_id::{TaskCode, TaskId};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FsTaskStore::new(dir.path().join("tasks"));

        let id = TaskId::from_parts("TEST", "20260101", 1).unwrap();
        let task = Task::new(id.clone(), TaskCode::new("TEST__20260101"), "a goal", "tests");
        store.save(&task).await.unwrap();

        let loaded = store.load(id.as_str()).await.unwrap().unwrap();
        assert_eq!(loaded, task);
        assert!(store.load("MISSING-20260101-001").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = FsTaskStore::new(dir.path().join("tasks"));

        for i in 1..=3 {
            let id = TaskId::from_parts("TEST", "20260101", i).unwrap();
            let task = Task::new(id, TaskCode::new(format!("T{i}")), "goal", "tests");
            store.save(&task).await.unwrap();
        }
        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 3);
        assert!(listed.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }
}
