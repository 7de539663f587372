//! Direct messaging over the tool surface: admin sends, receive/mark,
//! hash stability, result aggregation.

mod common;

use atabus::domain::models::message::AtaMessage;
use atabus::domain::models::task::SubtaskStatus;
use atabus::services::coordinator::RegisterAgent;
use atabus::services::{AuthContext, CreateTask};
use serde_json::json;

async fn register_pair(bus: &common::TestBus) {
    bus.coordinator
        .register_agent(RegisterAgent::new("GPT-Main", "GPT", "architect").with_numeric_code(2))
        .await
        .unwrap();
    bus.coordinator
        .register_agent(RegisterAgent::new("Tester", "GPT", "tester").with_numeric_code(7))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_admin_direct_send_and_receive() {
    let bus = common::test_bus().await;
    register_pair(&bus).await;
    let admin = AuthContext::admin("admin");

    let sent = bus
        .bus
        .execute(
            "ata_send",
            json!({
                "taskcode": "DIRECT__20260101",
                "from_agent": "GPT-Main",
                "to_agent": "Tester",
                "payload": {"message": "@Tester#07 direct delivery"},
            }),
            &admin,
        )
        .await;
    assert_eq!(sent["success"], true, "{sent}");
    let msg_id = sent["msg_id"].as_str().unwrap().to_string();
    assert_eq!(sent["sha256"].as_str().unwrap().len(), 64);

    // receiver sees it unread
    let received = bus
        .bus
        .execute("ata_receive", json!({"agent_id": "Tester"}), &AuthContext::user("Tester"))
        .await;
    assert_eq!(received["count"], 1);
    assert_eq!(received["messages"][0]["msg_id"], msg_id);

    // mark read: gone from the unread view
    let marked = bus
        .bus
        .execute(
            "ata_message_mark",
            json!({"msg_ids": [msg_id], "status": "read"}),
            &AuthContext::user("Tester"),
        )
        .await;
    assert_eq!(marked["success"], true);
    let received = bus
        .bus
        .execute("ata_receive", json!({"agent_id": "Tester"}), &AuthContext::user("Tester"))
        .await;
    assert_eq!(received["count"], 0);
}

#[tokio::test]
async fn test_persisted_message_hash_is_stable() {
    let bus = common::test_bus().await;
    register_pair(&bus).await;
    let admin = AuthContext::admin("admin");

    let sent = bus
        .bus
        .execute(
            "ata_send",
            json!({
                "taskcode": "HASH__20260101",
                "from_agent": "GPT-Main",
                "to_agent": "Tester",
                "payload": {"message": "@Tester#07 hash me", "key_points": ["a"]},
            }),
            &admin,
        )
        .await;
    assert_eq!(sent["success"], true, "{sent}");

    // reload from disk and recompute: stored sha256 must reproduce
    let file_path = sent["file_path"].as_str().unwrap();
    let content = tokio::fs::read_to_string(file_path).await.unwrap();
    let message: AtaMessage = serde_json::from_str(&content).unwrap();
    assert!(message.verify_sha256());
    assert_eq!(message.sha256.as_deref(), sent["sha256"].as_str());
}

#[tokio::test]
async fn test_direct_send_enforces_comm_prefix() {
    let bus = common::test_bus().await;
    register_pair(&bus).await;
    let admin = AuthContext::admin("admin");

    let sent = bus
        .bus
        .execute(
            "ata_send",
            json!({
                "taskcode": "PREFIX__20260101",
                "from_agent": "GPT-Main",
                "to_agent": "Tester",
                "payload": {"message": "missing prefix"},
            }),
            &admin,
        )
        .await;
    assert_eq!(sent["success"], false);
    assert!(sent["error"].as_str().unwrap().contains("@Tester#07"));
}

#[tokio::test]
async fn test_conversation_context_attached_and_rolls() {
    let bus = common::test_bus().await;
    register_pair(&bus).await;
    let admin = AuthContext::admin("admin");

    for i in 0..3 {
        let sent = bus
            .bus
            .execute(
                "ata_send",
                json!({
                    "taskcode": "CTX__20260101",
                    "from_agent": "GPT-Main",
                    "to_agent": "Tester",
                    "payload": {
                        "message": format!("@Tester#07 round {i}"),
                        "next_actions": [format!("action-{i}")],
                    },
                }),
                &admin,
            )
            .await;
        assert_eq!(sent["success"], true, "{sent}");
    }

    let thread = bus.messenger.thread("CTX__20260101").await.unwrap();
    assert_eq!(thread.len(), 3);
    let last_ctx = thread.last().unwrap().context.as_ref().unwrap();
    assert_eq!(last_ctx["message_index"], 3);
    assert_eq!(last_ctx["participants"], json!(["GPT-Main", "Tester"]));
    // the last 3 accumulated actions ride along as suggestions
    assert_eq!(
        last_ctx["suggested_actions"],
        json!(["action-0", "action-1", "action-2"])
    );
}

#[tokio::test]
async fn test_result_get_merges_subtask_results() {
    let bus = common::test_bus().await;
    let admin = AuthContext::admin("admin");

    let mut params = CreateTask::new("work");
    params.required_roles = Some(vec!["implementer".to_string(), "tester".to_string()]);
    let created = bus.orchestrator.create_task(params).await.unwrap();
    let task_id = created.task_id.as_str().to_string();
    let task = bus.orchestrator.get_task(&task_id).await.unwrap();

    for (i, st) in task.plan.subtasks.iter().enumerate() {
        bus.orchestrator
            .update_subtask_status(
                &task_id,
                &st.subtask_id,
                SubtaskStatus::Completed,
                Some(format!("agent-{i}")),
                Some(json!({"report": format!("output {i}")})),
                None,
            )
            .await
            .unwrap();
    }

    let result = bus
        .bus
        .execute(
            "result_get",
            json!({"task_id": task_id, "merge_strategy": "intelligent"}),
            &admin,
        )
        .await;
    assert_eq!(result["success"], true, "{result}");
    let merged = &result["merged"];
    assert_eq!(merged["strategy"], "intelligent");
    assert_eq!(merged["documentation"].as_array().unwrap().len(), 2);

    let concat = bus
        .bus
        .execute(
            "result_get",
            json!({"task_id": task_id, "merge_strategy": "concatenate"}),
            &admin,
        )
        .await;
    assert_eq!(concat["merged"]["subtasks"].as_array().unwrap().len(), 2);
}
