//! Domain errors for the atabus system.

use thiserror::Error;

/// Domain-level errors that can occur across the bus core.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("ADMIN_REQUIRED: {0} requires ATA admin privileges (fail-closed)")]
    AdminRequired(String),

    #[error("Sender not registered: {0}")]
    SenderNotRegistered(String),

    #[error("Recipient not registered: {0}")]
    RecipientNotRegistered(String),

    #[error("Send disabled for agent: {0}")]
    SendDisabled(String),

    #[error("{0}")]
    TemplateInvalid(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Outbox request not found: {0}")]
    OutboxRequestNotFound(String),

    #[error("Outbox request not pending: status={0}")]
    OutboxRequestNotPending(String),

    #[error("Invalid area: {0} (must match [A-Za-z0-9_-]+)")]
    InvalidArea(String),

    #[error("Mapping conflict: {taskcode} / {task_id}")]
    MappingConflict { taskcode: String, task_id: String },

    #[error("Workflow template not found: {0}")]
    WorkflowTemplateNotFound(String),

    #[error("Verdict parse error: {0}")]
    VerdictParse(String),

    #[error("Base revision mismatch: current_rev={current_rev}")]
    RevConflict { current_rev: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Bridge push failed: {0}")]
    BridgePush(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Io(err.to_string())
    }
}
