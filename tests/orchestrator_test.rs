//! Orchestrated task lifecycle: decomposition, status derivation, progress.

mod common;

use atabus::domain::models::task::{SubtaskStatus, TaskStatus};
use atabus::services::CreateTask;

#[tokio::test]
async fn test_create_task_decomposes_by_roles() {
    let bus = common::test_bus().await;

    let created = bus
        .orchestrator
        .create_task(CreateTask::new("design the system and test the result"))
        .await
        .unwrap();
    assert!(created.subtasks_count >= 2);
    assert!(created.can_parallelize);

    let task = bus.orchestrator.get_task(created.task_id.as_str()).await.unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.plan.subtasks.len(), created.subtasks_count);
    assert!(task.plan.subtasks[0].subtask_id.ends_with("-ST001"));

    // TaskCreated landed in the event store with the task as correlation
    let events = bus
        .event_store
        .list_by_correlation(created.task_id.as_str(), 10)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn test_create_task_with_template() {
    let bus = common::test_bus().await;

    let mut params = CreateTask::new("run the standard pipeline");
    params.workflow_template = Some("multi_agent_collaboration".to_string());
    let created = bus.orchestrator.create_task(params).await.unwrap();
    assert_eq!(created.subtasks_count, 4);

    let task = bus.orchestrator.get_task(created.task_id.as_str()).await.unwrap();
    // template dependencies were rewritten to subtask ids
    let implementer = &task.plan.subtasks[1];
    assert_eq!(implementer.step_id, "implementer");
    assert_eq!(implementer.depends_on, vec![task.plan.subtasks[0].subtask_id.clone()]);
}

#[tokio::test]
async fn test_unknown_template_rejected() {
    let bus = common::test_bus().await;
    let mut params = CreateTask::new("whatever");
    params.workflow_template = Some("nope".to_string());
    assert!(bus.orchestrator.create_task(params).await.is_err());
}

#[tokio::test]
async fn test_status_derivation_through_updates() {
    let bus = common::test_bus().await;

    let mut params = CreateTask::new("work");
    params.required_roles = Some(vec!["implementer".to_string(), "tester".to_string()]);
    let created = bus.orchestrator.create_task(params).await.unwrap();
    let task_id = created.task_id.as_str().to_string();
    let task = bus.orchestrator.get_task(&task_id).await.unwrap();
    let st1 = task.plan.subtasks[0].subtask_id.clone();
    let st2 = task.plan.subtasks[1].subtask_id.clone();

    // one running → task running, started_at stamped
    let task = bus
        .orchestrator
        .update_subtask_status(&task_id, &st1, SubtaskStatus::Running, Some("agent-a".to_string()), None, None)
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Running);
    assert!(task.plan.subtasks[0].started_at.is_some());

    // first completes, second still pending with met deps → pending overall
    let task = bus
        .orchestrator
        .update_subtask_status(
            &task_id,
            &st1,
            SubtaskStatus::Completed,
            None,
            Some(serde_json::json!({"out": 1})),
            None,
        )
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.plan.subtasks[0].completed_at.is_some());
    let progress = task.progress();
    assert_eq!(progress.total, 2);
    assert_eq!(progress.completed, 1);
    assert_eq!(progress.percentage, 50);

    // all completed → completed
    let task = bus
        .orchestrator
        .update_subtask_status(&task_id, &st2, SubtaskStatus::Completed, None, None, None)
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.progress().percentage, 100);
}

#[tokio::test]
async fn test_failed_subtask_fails_task() {
    let bus = common::test_bus().await;

    let mut params = CreateTask::new("work");
    params.required_roles = Some(vec!["implementer".to_string(), "tester".to_string()]);
    let created = bus.orchestrator.create_task(params).await.unwrap();
    let task_id = created.task_id.as_str().to_string();
    let task = bus.orchestrator.get_task(&task_id).await.unwrap();
    let st1 = task.plan.subtasks[0].subtask_id.clone();

    let task = bus
        .orchestrator
        .update_subtask_status(
            &task_id,
            &st1,
            SubtaskStatus::Failed,
            None,
            None,
            Some("exploded".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.plan.subtasks[0].error.as_deref(), Some("exploded"));
}

#[tokio::test]
async fn test_subtask_completion_publishes_event() {
    let bus = common::test_bus().await;

    let created = bus.orchestrator.create_task(CreateTask::new("work")).await.unwrap();
    let task_id = created.task_id.as_str().to_string();
    let st = bus.orchestrator.get_task(&task_id).await.unwrap().plan.subtasks[0]
        .subtask_id
        .clone();

    bus.orchestrator
        .update_subtask_status(&task_id, &st, SubtaskStatus::Completed, None, None, None)
        .await
        .unwrap();

    let events = bus.event_store.list_by_correlation(&st, 10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].event_type,
        atabus::domain::models::event::EventType::SubtaskCompleted
    );
}
