//! End-to-end tests against the composed orchestrator container. Backend
//! calls are expected to fail against unreachable hosts; the point of these
//! tests is that failure degrades gracefully rather than panicking.

use task_orchestrator_core::config::OrchestratorConfig;
use task_orchestrator_core::orchestrator::OrchestratorContainer;
use task_orchestrator_core::types::{Intent, StepData, StepStatus};

fn container() -> OrchestratorContainer {
    OrchestratorContainer::new(OrchestratorConfig::from_env()).expect("container construction should not fail")
}

#[tokio::test]
async fn query_request_never_executes_and_always_returns_a_response() {
    let container = container();
    let response = container.handle_request("what is the system status", None, false).await;
    assert_eq!(response.intent, Intent::Query);
    assert!(response.execution_plan.is_none());
    assert!(response.task_result.is_none());
    assert!(!response.response.is_empty());
}

#[tokio::test]
async fn actionable_request_without_auto_execute_produces_plan_but_no_result() {
    let container = container();
    let response = container.handle_request("check system health", None, false).await;
    let plan = response.execution_plan.expect("actionable request should produce a plan");
    assert!(response.task_result.is_none());
    assert!(plan.requires_approval);
    assert!(!plan.steps.is_empty());
}

#[tokio::test]
async fn actionable_request_with_auto_execute_runs_when_verdict_allows_it() {
    let container = container();
    let response = container.handle_request("check system health", None, true).await;
    assert!(response.execution_plan.is_some());
    if let Some(result) = &response.task_result {
        assert_eq!(result.results.len(), result.summary.total);
    }
}

#[tokio::test]
async fn conversation_persists_across_a_session() {
    let container = container();
    let first = container.handle_request("hello", None, false).await;
    let second = container
        .handle_request("what did I just say", Some(first.session_id.clone()), false)
        .await;
    assert_eq!(first.session_id, second.session_id);

    let session = container.get_session(&first.session_id).await.expect("session should exist");
    assert_eq!(session.messages.len(), 4);
}

#[tokio::test]
async fn dangerous_request_is_flagged_high_safety_and_needs_approval() {
    let container = container();
    let response = container.handle_request("delete the production database", None, true).await;
    let plan = response.execution_plan.expect("actionable request should produce a plan");
    assert_eq!(plan.safety_level, task_orchestrator_core::types::SafetyLevel::High);
}

#[tokio::test]
async fn safe_code_creation_writes_the_generated_artifact_into_the_safe_zone() {
    let container = container();
    let path = "playground/integration-test-hello.py";
    let _ = std::fs::remove_file(path);

    let response = container
        .handle_request(
            "Create a simple hello world program. Save to playground/integration-test-hello.py",
            None,
            true,
        )
        .await;

    assert_eq!(response.intent, Intent::Create);
    let plan = response.execution_plan.expect("creation request should produce a plan");
    assert_eq!(
        plan.steps,
        vec![
            "Analyze code requirements",
            "Design code structure",
            "Generate code",
            "Validate generated code",
            "Create file in safe zone",
            "Verify file exists",
        ]
    );

    // The inference backend is unreachable in this environment, so the
    // "Generate code" step fails and the plan halts there without reaching
    // file creation; this still exercises intent classification, safe-zone
    // auto-execute routing, and the decomposed step sequence end to end.
    let result = response.task_result.expect("auto_execute should run the plan");
    assert_eq!(result.results[0].step, "Analyze code requirements");
    assert_eq!(result.results[1].step, "Design code structure");

    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn code_creation_plan_writes_and_verifies_the_artifact_when_generation_succeeds() {
    let container = container();
    let path = "playground/integration-test-hello-generated.py";
    let _ = std::fs::remove_file(path);

    let steps = task_orchestrator_core::decomposer::decompose_task(
        "Create a simple hello world program. Save to playground/integration-test-hello-generated.py",
    );
    let context = StepData {
        target_path: task_orchestrator_core::decomposer::extract_target_path(
            "Create a simple hello world program. Save to playground/integration-test-hello-generated.py",
        ),
        // Stands in for a successful "Generate code" step, since no inference
        // backend is reachable in this environment.
        generated_code: Some("print('hello world')".to_string()),
        ..StepData::default()
    };

    let results = container.execution.execute_task(&steps, context).await;
    let by_step: std::collections::HashMap<_, _> = results.iter().map(|r| (r.step.as_str(), r)).collect();

    assert_eq!(by_step["Create file in safe zone"].status, StepStatus::Completed);
    assert_eq!(by_step["Verify file exists"].status, StepStatus::Completed);
    assert_eq!(std::fs::read_to_string(path).unwrap(), "print('hello world')");

    let _ = std::fs::remove_file(path);
}
