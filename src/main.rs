//! Atabus daemon entry point.
//!
//! Boots the bus: configuration, tracing, database (with migrations), the
//! service graph, and one subscriber loop per lane. Runs until ctrl-c,
//! then drains and exits.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use atabus::adapters::fs::{FsEventStore, FsTaskStore};
use atabus::adapters::sqlite::{
    all_embedded_migrations, create_pool, Migrator, RetryConfig, SqliteBridgeDedupe,
    SqliteIdRepository, SqliteMessageQueue,
};
use atabus::domain::ports::{EventStore, MessageQueue, TaskStore};
use atabus::infrastructure::config::ConfigLoader;
use atabus::infrastructure::logging::{init_tracing, AuditLogger};
use atabus::services::{
    AgentCoordinator, BoardSubscriber, BoardWriter, BridgeSubscriber, ConversationStore,
    EventPublisher, IngressBridge, Messenger, OrchestratorSubscriber, OutboxService,
    ResultAggregator, TaskIdManager, TaskOrchestrator, ToolBus, VerdictHandler, WorkflowEngine,
};

#[derive(Parser)]
#[command(name = "atabus", version, about = "Event-driven multi-agent task bus")]
struct Cli {
    /// Path to a configuration file (defaults to .atabus/config.yaml)
    #[arg(long, env = "ATABUS_CONFIG")]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    let _log_guard = init_tracing(&config.logging);

    let database_url = format!("sqlite:{}", config.database.path);
    let pool = create_pool(&database_url, None)
        .await
        .context("Failed to connect to database")?;
    let applied = Migrator::new(pool.clone())
        .run_embedded_migrations(all_embedded_migrations())
        .await
        .context("Failed to run database migrations")?;
    if applied > 0 {
        tracing::info!(applied, "database migrations applied");
    }

    let state = config.state.clone();

    let queue: Arc<dyn MessageQueue> = Arc::new(
        SqliteMessageQueue::new(pool.clone()).with_retry_config(RetryConfig {
            max_retries: config.queue.max_retries,
            retry_delays_secs: config.queue.retry_delays_secs.clone(),
        }),
    );
    let event_store: Arc<dyn EventStore> = Arc::new(FsEventStore::new(state.events_dir()));
    let task_store: Arc<dyn TaskStore> = Arc::new(FsTaskStore::new(state.tasks_dir()));

    let task_ids = TaskIdManager::new(SqliteIdRepository::new(pool.clone()));
    let publisher = EventPublisher::new(event_store.clone(), queue.clone());

    let coordinator = Arc::new(
        AgentCoordinator::open(state.registry_file(), state.applications_file())
            .await
            .context("Failed to open agent registry")?,
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
            .context("Failed to open outbox")?,
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
        .context("Failed to open workflow engine")?,
    );
    let verdict_handler = Arc::new(VerdictHandler::new(
        publisher.clone(),
        orchestrator.clone(),
        task_ids.clone(),
    ));
    let aggregator = Arc::new(ResultAggregator::new(task_store.clone(), messenger.clone()));
    let bridge = Arc::new(IngressBridge::new(
        config.ingress.clone(),
        task_ids.clone(),
        publisher.clone(),
        SqliteBridgeDedupe::new(pool.clone()),
    ));
    let board = Arc::new(BoardWriter::new(state.board_file()));
    let audit = Arc::new(AuditLogger::new(state.audit_dir()));

    let _bus = Arc::new(ToolBus::new(
        state.clone(),
        coordinator.clone(),
        outbox,
        messenger,
        orchestrator.clone(),
        workflow_engine,
        verdict_handler,
        aggregator,
        bridge.clone(),
        board.clone(),
        audit,
    ));

    // subscriber loops, one per lane
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poll = Duration::from_secs(config.subscribers.poll_interval_secs);

    let mut handles = Vec::new();
    handles.push(tokio::spawn(atabus::services::subscribers::run_subscriber_loop(
        queue.clone(),
        Arc::new(BoardSubscriber::new(board, task_ids.clone())),
        poll,
        shutdown_rx.clone(),
    )));
    handles.push(tokio::spawn(atabus::services::subscribers::run_subscriber_loop(
        queue.clone(),
        Arc::new(OrchestratorSubscriber::new(orchestrator)),
        poll,
        shutdown_rx.clone(),
    )));
    handles.push(tokio::spawn(atabus::services::subscribers::run_subscriber_loop(
        queue.clone(),
        Arc::new(BridgeSubscriber::new(bridge)),
        poll,
        shutdown_rx.clone(),
    )));

    // periodic stale-agent GC
    {
        let coordinator = coordinator.clone();
        let mut shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(60)) => {
                        match coordinator.cleanup_stale_agents().await {
                            Ok(stale) if !stale.is_empty() => {
                                tracing::info!(count = stale.len(), "stale agents marked unavailable");
                            }
                            Ok(_) => {}
                            Err(e) => tracing::warn!(error = %e, "stale-agent GC failed"),
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        }));
    }

    tracing::info!("atabus started; press ctrl-c to stop");
    tokio::signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;
    tracing::info!("shutting down, draining subscribers");
    let _ = shutdown_tx.send(true);
    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}
