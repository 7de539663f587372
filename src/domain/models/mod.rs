//! Domain models.

pub mod agent;
pub mod event;
pub mod message;
pub mod outbox;
pub mod pack;
pub mod queue;
pub mod task;
pub mod task_id;
pub mod verdict;
pub mod workflow;

pub use agent::{AgentCategory, AgentRecord, AgentStatus};
pub use event::{Event, EventType};
pub use message::{AtaMessage, MessageKind, MessageStatus};
pub use outbox::{OutboxRequest, OutboxStatus, SendResult};
pub use queue::{DlqMessage, QueueMessage, QueueMessageStatus};
pub use task::{Priority, Subtask, SubtaskStatus, Task, TaskConstraints, TaskPlan, TaskProgress, TaskStatus};
pub use task_id::{TaskCode, TaskId};
pub use verdict::{Verdict, VerdictStatus};
pub use workflow::{
    RetryPolicy, StepStatus, WorkflowInstance, WorkflowStatus, WorkflowStep, WorkflowTemplate,
};
