use std::sync::Arc;

use serde_json::json;
use tokio::sync::RwLock;

use psyche_agents::AgentCatalog;
use psyche_core::config::EngineConfig;
use psyche_test_utils::payload;
use psyche_workflow::{
    ChainBuilder, ChainFormat, ExecutionStatus, MemorySessionStore, NodeStatus, SafetyLevel,
    SessionTurnRunner, WorkflowEngine,
};

const ASSESSMENT: &str = include_str!("../chains/assessment.toml");

const TEXT: &str = "I feel alone and worried. I must plan everything, \
                    and I care about my family and friends.";

fn engine() -> Arc<WorkflowEngine> {
    let mut builder = ChainBuilder::new();
    AgentCatalog::with_builtins().register_into(&mut builder);
    builder
        .import_chain(ASSESSMENT, ChainFormat::Toml)
        .expect("demo chain parses");
    Arc::new(WorkflowEngine::new(
        Arc::new(RwLock::new(builder)),
        EngineConfig::default(),
    ))
}

#[tokio::test]
async fn test_demo_chain_is_valid() {
    let engine = engine();
    let builder = engine.builder().read().await;
    assert_eq!(builder.validate_chain("assessment"), (true, vec![]));
}

#[tokio::test]
async fn test_demo_chain_end_to_end() {
    let engine = engine();
    let execution = engine
        .execute_chain("assessment", payload([("text", json!(TEXT))]), Some("u1"), None)
        .await
        .expect("execution created");

    assert_eq!(execution.status, ExecutionStatus::Completed, "{:?}", execution.error);
    assert_eq!(execution.node_executions.len(), 7);
    assert_eq!(execution.execution_order.first().map(String::as_str), Some("translate"));
    assert_eq!(execution.execution_order.last().map(String::as_str), Some("report"));
    assert!(execution
        .node_executions
        .values()
        .all(|n| n.status == NodeStatus::Succeeded));

    let translate = &execution.node_executions["translate"].output_data;
    assert_eq!(translate["source_language"], json!("en"));
    assert_eq!(translate["translated_text"], json!(TEXT));

    let big_five = &execution.node_executions["big_five"].output_data;
    assert_eq!(big_five["dominant_trait"], json!("neuroticism"));

    let values = &execution.node_executions["values"].output_data;
    assert_eq!(values["top_values"], json!(["benevolence"]));

    let report = &execution.node_executions["report"].output_data;
    assert_eq!(report["safety_level"], json!("moderate"));
    assert_eq!(report["profile"]["dominant_part"], json!("manager"));
    assert_eq!(report["profile"]["dominant_trait"], json!("neuroticism"));
    let summary = report["summary"].as_str().expect("summary string");
    assert!(summary.contains("Dominant part: manager"));
    assert!(summary.contains("Top values: benevolence"));
    assert!(execution.node_executions["report"].confidence.is_some());
}

#[tokio::test]
async fn test_unsupported_language_fails_the_entry_node() {
    let engine = engine();
    let execution = engine
        .execute_chain(
            "assessment",
            payload([("text", json!(TEXT)), ("target_language", json!("de"))]),
            None,
            None,
        )
        .await
        .expect("execution created");

    assert_eq!(execution.status, ExecutionStatus::Failed);
    let translate = &execution.node_executions["translate"];
    assert_eq!(translate.status, NodeStatus::Failed);
    assert_eq!(translate.error.as_deref(), Some("unsupported language code: de"));
    assert_eq!(
        execution.node_executions["features"].error.as_deref(),
        Some("upstream node 'translate' did not succeed")
    );
    assert_eq!(execution.node_executions["report"].status, NodeStatus::Skipped);
}

#[tokio::test]
async fn test_empty_text_is_rejected_by_validation() {
    let engine = engine();
    let execution = engine
        .execute_chain("assessment", payload([("text", json!("   "))]), None, None)
        .await
        .expect("execution created");

    assert_eq!(execution.status, ExecutionStatus::Failed);
    let translate = &execution.node_executions["translate"];
    assert_eq!(translate.status, NodeStatus::Failed);
    assert_eq!(translate.iterations, 0);
    assert!(translate.error.as_deref().unwrap_or_default().contains("'text' is empty"));
    assert_eq!(execution.node_executions["report"].status, NodeStatus::Skipped);
}

#[tokio::test]
async fn test_session_turns_accumulate() {
    let engine = engine();
    let store = Arc::new(MemorySessionStore::new());
    let runner = SessionTurnRunner::new(engine.clone(), store.clone());

    let first = runner
        .run_turn("s1", "assessment", payload([("text", json!(TEXT))]), Some("u1"), None)
        .await
        .expect("first turn");
    assert_eq!(first.state.turn_count, 1);
    assert_eq!(first.state.depth_level, 2);
    assert_eq!(first.state.safety_level, SafetyLevel::Moderate);

    let second = runner
        .run_turn(
            "s1",
            "assessment",
            payload([("text", json!("Everything feels hopeless lately."))]),
            None,
            None,
        )
        .await
        .expect("second turn");
    assert_eq!(second.state.turn_count, 2);
    assert_eq!(second.state.safety_level, SafetyLevel::High);
    assert_eq!(second.execution.user_id.as_deref(), Some("u1"));
    assert!(second.state.accumulated.contains_key("report"));
    assert_eq!(store.len().await, 1);

    let metrics = engine.get_execution_metrics().await;
    assert_eq!(metrics.total_executions, 2);
    assert_eq!(metrics.completed, 2);
}
