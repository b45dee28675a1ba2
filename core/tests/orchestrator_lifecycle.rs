#![allow(clippy::unwrap_used)]

//! End-to-end exercises across `initialize` / `run` / `cleanup` and the
//! scheduler's internal MCP, rather than any single module in isolation.

use ncp_core::NcpError;
use ncp_core::NcpPaths;
use ncp_core::Orchestrator;
use ncp_core::config_types::Profile;

#[tokio::test]
async fn empty_profile_initializes_and_tears_down_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let paths = NcpPaths::new(dir.path().to_path_buf());
    let orchestrator = Orchestrator::initialize_with_profile(paths.clone(), "default", Profile::default())
        .await
        .unwrap();

    assert!(orchestrator.find("", 5, false, 0.35).await.is_empty());

    let status = orchestrator.run("ncp:status", serde_json::json!({}), None).await.unwrap();
    let text = match &status.content[0] {
        mcp_types::ContentBlock::Text { text } => text.clone(),
        other => panic!("expected text content, got {other:?}"),
    };
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["mcpCount"], 0);

    orchestrator.cleanup().await;

    assert!(paths.tools_csv("default").exists(), "CSV cache should be finalized to disk on cleanup");
    assert!(paths.all_tools_json().exists(), "metadata cache should persist even with zero MCPs");
}

#[tokio::test]
async fn unknown_tool_identifier_reports_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let paths = NcpPaths::new(dir.path().to_path_buf());
    let orchestrator = Orchestrator::initialize_with_profile(paths, "default", Profile::default())
        .await
        .unwrap();

    let err = orchestrator
        .run("nonexistent:tool", serde_json::json!({}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, NcpError::McpNotFound { .. }));
    orchestrator.cleanup().await;
}

/// Scheduled tasks created through the `schedule` internal MCP persist
/// across an orchestrator restart, since `TaskManager::load` reads the same
/// `tasks.json`/`timings.json` files a fresh `Orchestrator::initialize`
/// would reload.
#[tokio::test]
async fn scheduled_task_survives_an_orchestrator_restart() {
    let dir = tempfile::tempdir().unwrap();
    let paths = NcpPaths::new(dir.path().to_path_buf());

    let orchestrator = Orchestrator::initialize_with_profile(paths.clone(), "default", Profile::default())
        .await
        .unwrap();
    let created = orchestrator
        .run(
            "schedule:create_task",
            serde_json::json!({
                "name": "nightly-report",
                "tool": "ncp:status",
                "cronExpression": "0 2 * * *",
            }),
            None,
        )
        .await
        .unwrap();
    let created_text = match &created.content[0] {
        mcp_types::ContentBlock::Text { text } => text.clone(),
        other => panic!("expected text content, got {other:?}"),
    };
    let created_value: serde_json::Value = serde_json::from_str(&created_text).unwrap();
    let task_id = created_value["id"].as_str().unwrap().to_string();
    orchestrator.cleanup().await;

    let restarted = Orchestrator::initialize_with_profile(paths, "default", Profile::default())
        .await
        .unwrap();
    let listed = restarted.run("schedule:list_tasks", serde_json::json!({}), None).await.unwrap();
    let listed_text = match &listed.content[0] {
        mcp_types::ContentBlock::Text { text } => text.clone(),
        other => panic!("expected text content, got {other:?}"),
    };
    let listed_value: serde_json::Value = serde_json::from_str(&listed_text).unwrap();
    let ids: Vec<&str> = listed_value["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&task_id.as_str()));
    restarted.cleanup().await;
}
