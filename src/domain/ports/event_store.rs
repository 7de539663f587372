//! Port for the append-only event store.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::event::Event;

/// Append-only persistence for events, one record per event_id.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, event: &Event) -> DomainResult<()>;

    async fn get(&self, event_id: &str) -> DomainResult<Option<Event>>;

    /// Events whose correlation_id matches, oldest first.
    async fn list_by_correlation(
        &self,
        correlation_id: &str,
        limit: usize,
    ) -> DomainResult<Vec<Event>>;

    async fn count(&self) -> DomainResult<usize>;
}
