//! Workflow engine: outbox-mediated dispatch and step progression.

mod common;

use atabus::domain::models::outbox::OutboxStatus;
use atabus::domain::models::workflow::{StepStatus, WorkflowStatus};
use atabus::services::coordinator::RegisterAgent;
use atabus::services::workflow_engine::ENGINE_AGENT_ID;
use atabus::services::ReviewAction;
use serde_json::json;

async fn register_workflow_agents(bus: &common::TestBus) {
    bus.coordinator
        .register_agent(RegisterAgent::new(ENGINE_AGENT_ID, "system", "system").with_numeric_code(1))
        .await
        .unwrap();
    for (i, (id, role)) in [
        ("Architect-1", "architect"),
        ("Implementer-1", "implementer"),
        ("Reviewer-1", "reviewer"),
        ("Tester-1", "tester"),
    ]
    .iter()
    .enumerate()
    {
        bus.coordinator
            .register_agent(
                RegisterAgent::new(*id, "GPT", *role)
                    .with_numeric_code(u8::try_from(i).unwrap() + 11),
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_execute_dispatches_first_step_via_outbox() {
    let bus = common::test_bus().await;
    register_workflow_agents(&bus).await;

    let mut inputs = serde_json::Map::new();
    inputs.insert("requirement".to_string(), json!("build the feature"));
    let started = bus
        .workflow_engine
        .execute_workflow("multi_agent_collaboration", inputs, None)
        .await
        .unwrap();
    assert_eq!(started.status, WorkflowStatus::Running);
    assert_eq!(started.steps_count, 4);

    let instance = bus.workflow_engine.get_instance(&started.instance_id).await.unwrap();
    let architect = &instance.steps[0];
    assert_eq!(architect.status, StepStatus::Running);
    assert_eq!(architect.assigned_agent.as_deref(), Some("Architect-1"));
    // the engine never sends directly: the step parked as pending_review
    let result = architect.result.as_ref().unwrap();
    assert_eq!(result["status"], "pending_review");
    let request_id = result["request_id"].as_str().unwrap();

    let request = bus.outbox.get_request(request_id).await.unwrap();
    assert_eq!(request.status, OutboxStatus::Pending);
    assert_eq!(request.from_agent, ENGINE_AGENT_ID);
    assert_eq!(request.to_agent, "Architect-1");
    assert!(request.taskcode.starts_with("ARCH-"));
    // triplet synthesized for audit-required steps
    assert!(request.report_path.is_some());
    assert!(request.selftest_log_path.is_some());
    assert!(request.evidence_dir.is_some());

    // the message text carries the mandatory @display prefix
    let text = request.payload["message"].as_str().unwrap();
    assert!(text.starts_with("@Architect-1#11"));

    // approval performs the real send
    let outcome = bus
        .outbox
        .review(request_id, ReviewAction::Approve, None, "admin")
        .await
        .unwrap();
    assert_eq!(outcome.status, OutboxStatus::Approved);
    let thread = bus.messenger.thread(&request.taskcode).await.unwrap();
    assert_eq!(thread.len(), 1);
}

#[tokio::test]
async fn test_complete_step_advances_dag() {
    let bus = common::test_bus().await;
    register_workflow_agents(&bus).await;

    let mut inputs = serde_json::Map::new();
    inputs.insert("requirement".to_string(), json!("feature"));
    let started = bus
        .workflow_engine
        .execute_workflow("multi_agent_collaboration", inputs, None)
        .await
        .unwrap();

    let instance = bus
        .workflow_engine
        .complete_step(
            &started.instance_id,
            "architect",
            json!({"design_doc": "the doc", "architecture_spec": "the spec"}),
        )
        .await
        .unwrap();

    assert_eq!(instance.steps[0].status, StepStatus::Completed);
    assert_eq!(instance.outputs["design_doc"], "the doc");
    // next step dispatched, with the architect's output threaded in
    let implementer = &instance.steps[1];
    assert_eq!(implementer.status, StepStatus::Running);
    assert_eq!(implementer.inputs["design_doc"], "the doc");
    assert_eq!(instance.current_step.as_deref(), Some("implementer"));
    assert_eq!(instance.status, WorkflowStatus::Running);
}

#[tokio::test]
async fn test_no_agent_for_role_fails_instance() {
    let bus = common::test_bus().await;
    // only the engine identity is registered; no architect exists
    bus.coordinator
        .register_agent(RegisterAgent::new(ENGINE_AGENT_ID, "system", "system").with_numeric_code(1))
        .await
        .unwrap();

    let started = bus
        .workflow_engine
        .execute_workflow("multi_agent_collaboration", serde_json::Map::new(), None)
        .await
        .unwrap();
    assert_eq!(started.status, WorkflowStatus::Failed);

    let instance = bus.workflow_engine.get_instance(&started.instance_id).await.unwrap();
    assert_eq!(instance.steps[0].status, StepStatus::Failed);
    assert!(instance.steps[0]
        .error
        .as_deref()
        .unwrap()
        .contains("No available agent found for role"));
}

#[tokio::test]
async fn test_unknown_workflow_rejected() {
    let bus = common::test_bus().await;
    let err = bus
        .workflow_engine
        .execute_workflow("no_such_flow", serde_json::Map::new(), None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no_such_flow"));
}

#[tokio::test]
async fn test_templates_seeded_on_open() {
    let bus = common::test_bus().await;
    let names = bus.workflow_engine.list_templates().await;
    for expected in [
        "quant_research_to_code",
        "multi_agent_collaboration",
        "parallel_exploration",
        "quality_assurance",
    ] {
        assert!(names.iter().any(|n| n == expected), "missing {expected}");
    }
    // the template file landed on disk
    assert!(bus.state.templates_file().exists());
}

#[tokio::test]
async fn test_workflow_progress_formula() {
    let bus = common::test_bus().await;
    register_workflow_agents(&bus).await;

    let mut inputs = serde_json::Map::new();
    inputs.insert("requirement".to_string(), json!("x"));
    let started = bus
        .workflow_engine
        .execute_workflow("multi_agent_collaboration", inputs, None)
        .await
        .unwrap();

    let instance = bus
        .workflow_engine
        .complete_step(&started.instance_id, "architect", json!({}))
        .await
        .unwrap();
    let (total, completed, percentage) = instance.progress();
    assert_eq!(total, 4);
    assert_eq!(completed, 1);
    assert_eq!(percentage, 25);
}
