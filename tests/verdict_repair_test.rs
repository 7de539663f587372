//! Verdict intake: normalization, repair fan-out, S4 scenario.

mod common;

use atabus::domain::models::event::EventType;
use atabus::domain::models::task::{Priority, SubtaskStatus, TaskStatus};
use atabus::domain::models::verdict::VerdictStatus;
use serde_json::json;

/// Seed a task whose code maps to a deterministic id.
async fn seed_task(bus: &common::TestBus, code: &str) -> String {
    let mut params = atabus::services::CreateTask::new("integration scenario");
    params.task_code = Some(code.to_string());
    let created = bus.orchestrator.create_task(params).await.unwrap();
    created.task_id.as_str().to_string()
}

#[tokio::test]
async fn test_fail_verdict_creates_repair_subtasks() {
    let bus = common::test_bus().await;
    let task_id = seed_task(&bus, "INTEGRATION_MVP_TEST__20260124").await;

    let verdict = json!({
        "status": "fail",
        "fail_codes": ["EVIDENCE_SCOPE_VIOLATION", "STAGE_MISSING"],
        "task_code": "INTEGRATION_MVP_TEST__20260124",
    });
    let outcome = bus.verdict_handler.process_verdict(verdict).await.unwrap();
    assert_eq!(outcome.task_id, task_id);
    assert_eq!(outcome.status, VerdictStatus::Fail);
    assert!(outcome.repair_subtasks_created);

    let task = bus.orchestrator.get_task(&task_id).await.unwrap();
    let repair_evidence = task
        .plan
        .subtasks
        .iter()
        .find(|st| st.subtask_id == format!("{task_id}-REPAIR-EVIDENCE_SCOPE_VIOLATION"))
        .expect("evidence repair subtask");
    let repair_stage = task
        .plan
        .subtasks
        .iter()
        .find(|st| st.subtask_id == format!("{task_id}-REPAIR-STAGE_MISSING"))
        .expect("stage repair subtask");

    for st in [repair_evidence, repair_stage] {
        assert_eq!(st.status, SubtaskStatus::Pending);
        assert_eq!(st.role, "quant_dev_infra");
        assert_eq!(st.action, "fix");
        assert_eq!(st.priority, Priority::High);
        assert_eq!(st.timeout_seconds, 3600);
        assert!(st.inputs.contains_key("fail_code"));
        assert!(st.inputs.contains_key("verdict_data"));
    }
    assert_eq!(
        repair_stage.description.as_deref(),
        Some("修复：补充缺失的阶段文件")
    );
    assert_eq!(repair_stage.outputs[0], "修复 STAGE_MISSING 问题");

    // one SubtaskCreated event per repair subtask, correlated to the subtask
    for st in [repair_evidence, repair_stage] {
        let events = bus
            .event_store
            .list_by_correlation(&st.subtask_id, 10)
            .await
            .unwrap();
        assert_eq!(events.len(), 1, "{}", st.subtask_id);
        assert_eq!(events[0].event_type, EventType::SubtaskCreated);
    }

    // and one VerdictGenerated correlated to the task
    let verdict_events: Vec<_> = bus
        .event_store
        .list_by_correlation(&task_id, 20)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == EventType::VerdictGenerated)
        .collect();
    assert_eq!(verdict_events.len(), 1);
    assert_eq!(verdict_events[0].payload["status"], "fail");
}

#[tokio::test]
async fn test_repair_subtasks_not_duplicated() {
    let bus = common::test_bus().await;
    seed_task(&bus, "DUP_TEST__20260124").await;

    let verdict = json!({
        "status": "FAIL",
        "fail_codes": ["STAGE_MISSING"],
        "task_code": "DUP_TEST__20260124",
    });
    let first = bus.verdict_handler.process_verdict(verdict.clone()).await.unwrap();
    assert!(first.repair_subtasks_created);

    // the same verdict again adds nothing
    let second = bus.verdict_handler.process_verdict(verdict).await.unwrap();
    assert!(!second.repair_subtasks_created);

    let task = bus.orchestrator.get_task(&second.task_id).await.unwrap();
    let repairs = task
        .plan
        .subtasks
        .iter()
        .filter(|st| st.subtask_id.contains("-REPAIR-"))
        .count();
    assert_eq!(repairs, 1);
}

#[tokio::test]
async fn test_pass_verdict_creates_no_repairs() {
    let bus = common::test_bus().await;
    seed_task(&bus, "PASS_TEST__20260124").await;

    let outcome = bus
        .verdict_handler
        .process_verdict(json!({
            "status": "PASS",
            "task_code": "PASS_TEST__20260124",
            "checks": [{"name": "gate", "status": "PASS"}],
        }))
        .await
        .unwrap();
    assert_eq!(outcome.status, VerdictStatus::Pass);
    assert!(!outcome.repair_subtasks_created);

    let task = bus.orchestrator.get_task(&outcome.task_id).await.unwrap();
    assert!(task.plan.subtasks.iter().all(|st| !st.subtask_id.contains("-REPAIR-")));
}

#[tokio::test]
async fn test_fail_codes_derived_from_checks() {
    let bus = common::test_bus().await;
    seed_task(&bus, "CHECKS_TEST__20260124").await;

    let outcome = bus
        .verdict_handler
        .process_verdict(json!({
            "status": "FAIL",
            "task_code": "CHECKS_TEST__20260124",
            "checks": [
                {"name": "stage-missing", "status": "FAIL"},
                {"name": "fine", "status": "PASS"},
            ],
        }))
        .await
        .unwrap();
    assert_eq!(outcome.fail_codes, vec!["STAGE_MISSING"]);
    assert!(outcome.repair_subtasks_created);
}

#[tokio::test]
async fn test_verdict_without_task_code_rejected() {
    let bus = common::test_bus().await;
    let err = bus
        .verdict_handler
        .process_verdict(json!({"status": "fail", "fail_codes": ["X"]}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Cannot determine task_id"));
}

#[tokio::test]
async fn test_verdict_file_round_trip() {
    let bus = common::test_bus().await;
    seed_task(&bus, "FILE_TEST__20260124").await;

    let verdict_path = bus.dir.path().join("verdict.json");
    tokio::fs::write(
        &verdict_path,
        serde_json::to_string_pretty(&json!({
            "status": "fail",
            "fail_codes": ["ABSOLUTE_PATH_IN_EVIDENCE"],
            "task_code": "FILE_TEST__20260124",
        }))
        .unwrap(),
    )
    .await
    .unwrap();

    let outcome = bus
        .verdict_handler
        .process_verdict_file(&verdict_path)
        .await
        .unwrap();
    assert!(outcome.repair_subtasks_created);

    // malformed file surfaces a parse error, no event emitted
    let bad_path = bus.dir.path().join("bad.json");
    tokio::fs::write(&bad_path, "{not json").await.unwrap();
    let before = bus.event_store.count().await.unwrap();
    assert!(bus.verdict_handler.process_verdict_file(&bad_path).await.is_err());
    assert_eq!(bus.event_store.count().await.unwrap(), before);
}

#[tokio::test]
async fn test_repair_resets_completed_task_to_waiting_or_pending() {
    let bus = common::test_bus().await;
    let task_id = seed_task(&bus, "RESET_TEST__20260124").await;

    // complete the single planned subtask
    let st = bus.orchestrator.get_task(&task_id).await.unwrap().plan.subtasks[0]
        .subtask_id
        .clone();
    bus.orchestrator
        .update_subtask_status(&task_id, &st, SubtaskStatus::Completed, None, None, None)
        .await
        .unwrap();
    assert_eq!(
        bus.orchestrator.get_task(&task_id).await.unwrap().status,
        TaskStatus::Completed
    );

    // a failing verdict re-opens the task with pending repair work
    bus.verdict_handler
        .process_verdict(json!({
            "status": "fail",
            "fail_codes": ["STAGE_MISSING"],
            "task_code": "RESET_TEST__20260124",
        }))
        .await
        .unwrap();
    let task = bus.orchestrator.get_task(&task_id).await.unwrap();
    assert_ne!(task.status, TaskStatus::Completed);

    // the taskcode mapping stayed intact through the repair round
    assert_eq!(
        bus.task_ids
            .get_task_id("RESET_TEST__20260124")
            .await
            .unwrap()
            .unwrap()
            .as_str(),
        task_id
    );
}
