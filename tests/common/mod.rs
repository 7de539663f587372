//! Shared test harness: a fully wired bus over a temp dir and an
//! in-memory sqlite pool.

use std::sync::Arc;
use tempfile::TempDir;

use atabus::adapters::fs::{FsEventStore, FsTaskStore};
use atabus::adapters::sqlite::{
    migrated_test_pool, SqliteBridgeDedupe, SqliteIdRepository, SqliteMessageQueue,
};
use atabus::domain::ports::{EventStore, MessageQueue, TaskStore};
use atabus::infrastructure::config::StateConfig;
use atabus::infrastructure::logging::AuditLogger;
use atabus::services::{
    AgentCoordinator, BoardWriter, ConversationStore, EventPublisher, IngressBridge,
    IngressConfig, Messenger, OutboxService, ResultAggregator, TaskIdManager, TaskOrchestrator,
    ToolBus, VerdictHandler, WorkflowEngine,
};

pub struct TestBus {
    pub dir: TempDir,
    pub state: StateConfig,
    pub queue: Arc<dyn MessageQueue>,
    pub event_store: Arc<dyn EventStore>,
    pub task_store: Arc<dyn TaskStore>,
    pub task_ids: TaskIdManager,
    pub publisher: EventPublisher,
    pub coordinator: Arc<AgentCoordinator>,
    pub messenger: Arc<Messenger>,
    pub outbox: Arc<OutboxService>,
    pub orchestrator: Arc<TaskOrchestrator>,
    pub workflow_engine: Arc<WorkflowEngine>,
    pub verdict_handler: Arc<VerdictHandler>,
    pub bridge: Arc<IngressBridge>,
    pub board: Arc<BoardWriter>,
    pub bus: Arc<ToolBus>,
}

pub async fn test_bus() -> TestBus {
    let dir = TempDir::new().expect("temp dir");
    let state = StateConfig { root: dir.path().join("state") };
    let pool = migrated_test_pool().await;

    let queue: Arc<dyn MessageQueue> = Arc::new(SqliteMessageQueue::new(pool.clone()));
    let event_store: Arc<dyn EventStore> = Arc::new(FsEventStore::new(state.events_dir()));
    let task_store: Arc<dyn TaskStore> = Arc::new(FsTaskStore::new(state.tasks_dir()));

    let task_ids = TaskIdManager::new(SqliteIdRepository::new(pool.clone()));
    let publisher = EventPublisher::new(event_store.clone(), queue.clone());

    let coordinator = Arc::new(
        AgentCoordinator::open(state.registry_file(), state.applications_file())
            .await
            .expect("open registry"),
    );
    let conversations = Arc::new(ConversationStore::new(state.contexts_dir()));
    let messenger = Arc::new(Messenger::new(
        state.messages_dir(),
        state.delivery_dir(),
        coordinator.clone(),
        conversations,
    ));
    let outbox = Arc::new(
        OutboxService::open(state.outbox_file(), coordinator.clone(), messenger.clone())
            .await
            .expect("open outbox"),
    );
    let orchestrator = Arc::new(TaskOrchestrator::new(
        task_store.clone(),
        task_ids.clone(),
        publisher.clone(),
        atabus::domain::models::workflow::default_templates(),
    ));
    let workflow_engine = Arc::new(
        WorkflowEngine::open(
            state.templates_file(),
            state.workflows_dir(),
            coordinator.clone(),
            outbox.clone(),
        )
        .await
        .expect("open workflow engine"),
    );
    let verdict_handler = Arc::new(VerdictHandler::new(
        publisher.clone(),
        orchestrator.clone(),
        task_ids.clone(),
    ));
    let aggregator = Arc::new(ResultAggregator::new(task_store.clone(), messenger.clone()));
    let bridge = Arc::new(IngressBridge::new(
        IngressConfig::default(),
        task_ids.clone(),
        publisher.clone(),
        SqliteBridgeDedupe::new(pool.clone()),
    ));
    let board = Arc::new(BoardWriter::new(state.board_file()));
    let audit = Arc::new(AuditLogger::new(state.audit_dir()));

    let bus = Arc::new(ToolBus::new(
        state.clone(),
        coordinator.clone(),
        outbox.clone(),
        messenger.clone(),
        orchestrator.clone(),
        workflow_engine.clone(),
        verdict_handler.clone(),
        aggregator,
        bridge.clone(),
        board.clone(),
        audit,
    ));

    TestBus {
        dir,
        state,
        queue,
        event_store,
        task_store,
        task_ids,
        publisher,
        coordinator,
        messenger,
        outbox,
        orchestrator,
        workflow_engine,
        verdict_handler,
        bridge,
        board,
        bus,
    }
}
