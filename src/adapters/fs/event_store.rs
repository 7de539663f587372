//! Filesystem event store: one JSON file per event, filename = event_id.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::event::Event;
use crate::domain::ports::EventStore;

#[derive(Clone)]
pub struct FsEventStore {
    events_dir: PathBuf,
}

impl FsEventStore {
    pub fn new(events_dir: impl Into<PathBuf>) -> Self {
        Self { events_dir: events_dir.into() }
    }

    pub fn events_dir(&self) -> &PathBuf {
        &self.events_dir
    }

    fn path_for(&self, event_id: &str) -> PathBuf {
        self.events_dir.join(format!("{event_id}.json"))
    }
}

#[async_trait]
impl EventStore for FsEventStore {
    async fn append(&self, event: &Event) -> DomainResult<()> {
        tokio::fs::create_dir_all(&self.events_dir).await?;
        let path = self.path_for(&event.event_id.to_string());
        if tokio::fs::try_exists(&path).await? {
            // append-only: an event_id is written exactly once
            return Ok(());
        }
        let json = serde_json::to_string_pretty(event)?;
        tokio::fs::write(&path, json).await?;
        Ok(())
    }

    async fn get(&self, event_id: &str) -> DomainResult<Option<Event>> {
        let path = self.path_for(event_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DomainError::Io(e.to_string())),
        }
    }

    async fn list_by_correlation(
        &self,
        correlation_id: &str,
        limit: usize,
    ) -> DomainResult<Vec<Event>> {
        let mut events = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.events_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(events),
            Err(e) => return Err(DomainError::Io(e.to_string())),
        };
        while let Some(entry) = dir.next_entry().await? {
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = tokio::fs::read_to_string(entry.path()).await?;
            let Ok(event) = serde_json::from_str::<Event>(&content) else {
                continue;
            };
            if event.correlation_id == correlation_id {
                events.push(event);
            }
        }
        events.sort_by_key(|e| e.timestamp);
        events.truncate(limit);
        Ok(events)
    }

    async fn count(&self) -> DomainResult<usize> {
        let mut count = 0;
        let mut dir = match tokio::fs::read_dir(&self.events_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(DomainError::Io(e.to_string())),
        };
        while let Some(entry) = dir.next_entry().await? {
            if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::event::EventType;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_append_and_get() {
        let dir = TempDir::new().unwrap();
        let store = FsEventStore::new(dir.path().join("events"));

        let event = Event::task_updated("T-1", "tests", serde_json::json!({"status": "running"}));
        store.append(&event).await.unwrap();

        let loaded = store.get(&event.event_id.to_string()).await.unwrap().unwrap();
        assert_eq!(loaded, event);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_append_is_write_once() {
        let dir = TempDir::new().unwrap();
        let store = FsEventStore::new(dir.path().join("events"));

        let mut event = Event::task_updated("T-1", "tests", serde_json::json!({"a": 1}));
        store.append(&event).await.unwrap();

        // same id, different payload: first write wins
        event.payload = serde_json::json!({"a": 2});
        store.append(&event).await.unwrap();

        let loaded = store.get(&event.event_id.to_string()).await.unwrap().unwrap();
        assert_eq!(loaded.payload, serde_json::json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_list_by_correlation_sorted() {
        let dir = TempDir::new().unwrap();
        let store = FsEventStore::new(dir.path().join("events"));

        for i in 0..3 {
            let event = Event::new(
                EventType::TaskUpdated,
                "T-corr",
                serde_json::json!({"i": i}),
                "tests",
            );
            store.append(&event).await.unwrap();
        }
        let other = Event::new(EventType::TaskUpdated, "T-other", serde_json::json!({}), "tests");
        store.append(&other).await.unwrap();

        let listed = store.list_by_correlation("T-corr", 10).await.unwrap();
        assert_eq!(listed.len(), 3);
        assert!(listed.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FsEventStore::new(dir.path().join("never-created"));
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.list_by_correlation("x", 5).await.unwrap().is_empty());
        assert!(store.get("nope").await.unwrap().is_none());
    }
}
