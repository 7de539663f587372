//! Service layer: one module per bus component.

pub mod aggregator;
pub mod board;
pub mod bridge;
pub mod bus;
pub mod conversation;
pub mod coordinator;
pub mod event_publisher;
pub mod messenger;
pub mod orchestrator;
pub mod outbox;
pub mod router;
pub mod subscribers;
pub mod task_id;
pub mod verdict;
pub mod workflow_engine;

pub use aggregator::{MergeStrategy, ResultAggregator};
pub use board::BoardWriter;
pub use bridge::{IngressBridge, IngressConfig, IngressTaskCreate};
pub use bus::{AuthContext, ToolBus};
pub use conversation::ConversationStore;
pub use coordinator::{AgentCoordinator, RegisterAgent};
pub use event_publisher::EventPublisher;
pub use messenger::{Messenger, SendMessage};
pub use orchestrator::{CreateTask, TaskOrchestrator};
pub use outbox::{OutboxService, ReviewAction};
pub use router::{RoutableTask, TaskRouter};
pub use subscribers::{
    BoardSubscriber, BridgeSubscriber, EventSubscriber, OrchestratorSubscriber,
};
pub use task_id::TaskIdManager;
pub use verdict::VerdictHandler;
pub use workflow_engine::WorkflowEngine;
