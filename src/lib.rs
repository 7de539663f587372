//! Atabus - event-driven multi-agent task bus
//!
//! Coordinates heterogeneous agents around shared tasks:
//! - Durable message queue (SQLite, WAL) with dedupe, retry, and DLQ
//! - Append-only event store with per-lane subscriber fan-out
//! - Agent registry with keyword routing and load balancing
//! - Task orchestration over subtask DAGs
//! - Outbox proxy-send with mandatory admin review
//! - CI verdict intake with automatic repair-subtask synthesis
//! - Bidirectional external ingress bridge

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export key types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use infrastructure::config::{Config, ConfigLoader};
