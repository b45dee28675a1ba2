//! Internal MCP dispatch (spec.md §4.10's `ncp`/`scheduler`/`skills`
//! reserved MCP names, covering SPEC_FULL's `ncp:status` / `ncp:list-mcps`,
//! `schedule:*`, and `skills:*` meta-tools). Handlers take an explicit
//! context rather than holding a reference to the orchestrator, so this
//! module never needs to borrow fields the orchestrator itself still holds
//! a lock on (spec.md §9).

use std::sync::Arc;

use serde_json::Value;
use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::NcpError;
use crate::health::HealthMonitor;
use crate::orchestrator::state::SharedIndex;
use crate::orchestrator::state::SkillPrompt;
use crate::paths::NcpPaths;
use crate::scheduler::ExecutionRecorder;
use crate::scheduler::Task;
use crate::scheduler::TaskManager;
use crate::scheduler::TaskStatus;
use crate::scheduler::parse_natural_language_schedule;

pub const INTERNAL_MCP_NAME: &str = "ncp";
pub const SCHEDULE_MCP_NAME: &str = "schedule";
pub const SKILLS_MCP_NAME: &str = "skills";

pub fn is_internal_mcp(mcp: &str) -> bool {
    mcp == INTERNAL_MCP_NAME || mcp == SCHEDULE_MCP_NAME || mcp == SKILLS_MCP_NAME
}

pub struct InternalMcpContext<'a> {
    pub index: &'a Arc<SharedIndex>,
    pub health: &'a Arc<HealthMonitor>,
    pub scheduler: &'a AsyncMutex<TaskManager>,
    pub paths: &'a NcpPaths,
}

pub async fn dispatch_internal_tool(
    mcp: &str,
    tool: &str,
    parameters: Value,
    ctx: &InternalMcpContext<'_>,
) -> Result<Value, NcpError> {
    match (mcp, tool) {
        (INTERNAL_MCP_NAME, "status") => Ok(status(ctx).await),
        (INTERNAL_MCP_NAME, "list-mcps") => Ok(list_mcps(ctx).await),
        (SCHEDULE_MCP_NAME, "create_task") => create_task(ctx, parameters).await,
        (SCHEDULE_MCP_NAME, "list_tasks") => Ok(list_tasks(ctx).await),
        (SCHEDULE_MCP_NAME, "pause_task") => set_task_status(ctx, parameters, TaskStatus::Paused).await,
        (SCHEDULE_MCP_NAME, "resume_task") => set_task_status(ctx, parameters, TaskStatus::Active).await,
        (SCHEDULE_MCP_NAME, "delete_task") => delete_task(ctx, parameters).await,
        (SCHEDULE_MCP_NAME, "list_executions") => list_executions(ctx),
        (SKILLS_MCP_NAME, "add") => add_skill(ctx, parameters).await,
        (SKILLS_MCP_NAME, "update") => update_skill(ctx, parameters).await,
        (SKILLS_MCP_NAME, "remove") => remove_skill(ctx, parameters).await,
        (SKILLS_MCP_NAME, "list") => Ok(list_skills(ctx).await),
        _ => Err(NcpError::McpNotFound {
            name: format!("{mcp}:{tool}"),
            suggestions: vec![
                format!("{INTERNAL_MCP_NAME}:status"),
                format!("{INTERNAL_MCP_NAME}:list-mcps"),
                format!("{SCHEDULE_MCP_NAME}:create_task"),
                format!("{SCHEDULE_MCP_NAME}:list_tasks"),
                format!("{SKILLS_MCP_NAME}:list"),
            ],
        }),
    }
}

async fn status(ctx: &InternalMcpContext<'_>) -> Value {
    let state = ctx.index.read().await;
    let mcp_count = state.definitions.len();
    let tool_count = state.all_tools.len();
    let names: Vec<String> = state.definitions.keys().cloned().collect();
    let healthy = ctx.health.filter_healthy(&names).await.len();
    json!({
        "mcpCount": mcp_count,
        "toolCount": tool_count,
        "healthyMcpCount": healthy,
        "unhealthyMcpCount": mcp_count.saturating_sub(healthy),
    })
}

async fn list_mcps(ctx: &InternalMcpContext<'_>) -> Value {
    let state = ctx.index.read().await;
    let mut entries = Vec::new();
    for (name, definition) in &state.definitions {
        let healthy = ctx.health.is_healthy(name).await;
        let last_error = ctx.health.last_error(name).await;
        entries.push(json!({
            "name": name,
            "toolCount": definition.tools.len(),
            "healthy": healthy,
            "lastError": last_error,
        }));
    }
    entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
    json!({ "mcps": entries })
}

/// `schedule:create_task` (SPEC_FULL §3). Accepts either a literal
/// `cronExpression` or a `schedule` natural-language phrase (spec.md §4.12);
/// exactly one must be present.
async fn create_task(ctx: &InternalMcpContext<'_>, parameters: Value) -> Result<Value, NcpError> {
    let name = parameters
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| NcpError::ValidationError { missing: vec!["name".to_string()] })?
        .to_string();
    let tool = parameters
        .get("tool")
        .and_then(Value::as_str)
        .ok_or_else(|| NcpError::ValidationError { missing: vec!["tool".to_string()] })?
        .to_string();
    let task_parameters = parameters.get("parameters").cloned().unwrap_or_else(|| json!({}));
    let max_executions = parameters.get("maxExecutions").and_then(Value::as_u64);

    let cron_expression = if let Some(cron) = parameters.get("cronExpression").and_then(Value::as_str) {
        cron.to_string()
    } else if let Some(phrase) = parameters.get("schedule").and_then(Value::as_str) {
        let parsed = parse_natural_language_schedule(phrase);
        if !parsed.success {
            return Err(NcpError::ConfigError(
                parsed.error.unwrap_or_else(|| "could not parse schedule".to_string()),
            ));
        }
        parsed.cron_expression.unwrap_or_default()
    } else {
        return Err(NcpError::ValidationError {
            missing: vec!["cronExpression or schedule".to_string()],
        });
    };
    let fire_once = parameters.get("fireOnce").and_then(Value::as_bool).unwrap_or(false);

    let mut scheduler = ctx.scheduler.lock().await;
    let timing_id = scheduler
        .get_or_create_timing_group(&cron_expression)
        .await
        .map_err(|err| NcpError::ConfigError(err.to_string()))?;
    let task = Task {
        id: uuid::Uuid::new_v4().to_string(),
        name,
        timing_id: timing_id.clone(),
        cron_expression: cron_expression.clone(),
        tool,
        parameters: task_parameters,
        status: TaskStatus::Active,
        fire_once,
        max_executions,
        created_at: chrono::Utc::now(),
        execution_count: 0,
        last_execution_id: None,
    };
    let id = task.id.clone();
    scheduler
        .create_task(task)
        .map_err(|err| NcpError::ConfigError(err.to_string()))?;
    Ok(json!({ "id": id, "timingId": timing_id, "cronExpression": cron_expression }))
}

async fn list_tasks(ctx: &InternalMcpContext<'_>) -> Value {
    let scheduler = ctx.scheduler.lock().await;
    let tasks: Vec<&Task> = scheduler.list_tasks();
    json!({ "tasks": tasks })
}

async fn set_task_status(
    ctx: &InternalMcpContext<'_>,
    parameters: Value,
    status: TaskStatus,
) -> Result<Value, NcpError> {
    let id = parameters
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| NcpError::ValidationError { missing: vec!["id".to_string()] })?;
    let mut scheduler = ctx.scheduler.lock().await;
    scheduler
        .set_status(id, status)
        .map_err(|err| NcpError::McpNotFound { name: err.to_string(), suggestions: Vec::new() })?;
    Ok(json!({ "success": true }))
}

async fn delete_task(ctx: &InternalMcpContext<'_>, parameters: Value) -> Result<Value, NcpError> {
    let id = parameters
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| NcpError::ValidationError { missing: vec!["id".to_string()] })?;
    let mut scheduler = ctx.scheduler.lock().await;
    let removed_timing_group = scheduler
        .delete_task(id)
        .await
        .map_err(|err| NcpError::McpNotFound { name: err.to_string(), suggestions: Vec::new() })?;
    Ok(json!({ "removedTimingGroup": removed_timing_group }))
}

fn list_executions(ctx: &InternalMcpContext<'_>) -> Result<Value, NcpError> {
    let recorder = ExecutionRecorder::new(ctx.paths);
    let rows = recorder
        .query_executions()
        .map_err(|err| NcpError::CacheCorruption(err.to_string()))?;
    Ok(json!({
        "executions": rows.into_iter().map(|row| json!({
            "executionId": row.execution_id,
            "jobId": row.job_id,
            "jobName": row.job_name,
            "tool": row.tool,
            "startedAt": row.started_at,
            "duration": row.duration,
            "status": row.status,
            "errorMessage": row.error_message,
        })).collect::<Vec<_>>(),
    }))
}

/// `skills:add` / `skills:update` (spec.md §4.10.3's "skill" lifecycle
/// mutation): both go through the same per-`{"skill", name}` lock and
/// snapshot/restore, the only difference being whether the name must be new.
async fn add_skill(ctx: &InternalMcpContext<'_>, parameters: Value) -> Result<Value, NcpError> {
    upsert_skill(ctx, parameters).await
}

async fn update_skill(ctx: &InternalMcpContext<'_>, parameters: Value) -> Result<Value, NcpError> {
    upsert_skill(ctx, parameters).await
}

async fn upsert_skill(ctx: &InternalMcpContext<'_>, parameters: Value) -> Result<Value, NcpError> {
    let name = parameters
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| NcpError::ValidationError { missing: vec!["name".to_string()] })?
        .to_string();
    let prompt = parameters
        .get("prompt")
        .and_then(Value::as_str)
        .ok_or_else(|| NcpError::ValidationError { missing: vec!["prompt".to_string()] })?
        .to_string();
    let description = parameters
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let skill = SkillPrompt {
        name: name.clone(),
        description,
        prompt,
    };
    ctx.index
        .mutate_atomically("skill", &name, move |state| {
            state.skill_prompts.insert(name.clone(), skill.clone());
            Ok(())
        })
        .await
        .map_err(|err| NcpError::CacheCorruption(err.to_string()))?;
    Ok(json!({ "success": true }))
}

async fn remove_skill(ctx: &InternalMcpContext<'_>, parameters: Value) -> Result<Value, NcpError> {
    let name = parameters
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| NcpError::ValidationError { missing: vec!["name".to_string()] })?
        .to_string();
    ctx.index
        .mutate_atomically("skill", &name, move |state| {
            state.skill_prompts.remove(&name);
            Ok(())
        })
        .await
        .map_err(|err| NcpError::CacheCorruption(err.to_string()))?;
    Ok(json!({ "success": true }))
}

async fn list_skills(ctx: &InternalMcpContext<'_>) -> Value {
    let state = ctx.index.read().await;
    let mut skills: Vec<&SkillPrompt> = state.skill_prompts.values().collect();
    skills.sort_by(|a, b| a.name.cmp(&b.name));
    json!({ "skills": skills })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::config_types::McpServerConfig;
    use crate::orchestrator::state::MCPDefinition;
    use std::collections::HashMap;

    fn tool(name: &str) -> mcp_types::Tool {
        mcp_types::Tool {
            name: name.to_string(),
            description: Some(format!("{name} tool")),
            input_schema: mcp_types::ToolInputSchema {
                r#type: "object".to_string(),
                properties: None,
                required: None,
            },
            output_schema: None,
            title: None,
            annotations: None,
        }
    }

    fn test_scheduler(dir: &std::path::Path) -> AsyncMutex<TaskManager> {
        AsyncMutex::new(
            TaskManager::load(
                dir.join("tasks.json"),
                dir.join("timings.json"),
                crate::scheduler::CronManager::new().unwrap(),
                "ncp-mcp-server _timing-fire {id}".to_string(),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn status_reports_mcp_and_tool_counts() {
        let index = SharedIndex::new();
        index
            .insert_mcp(MCPDefinition {
                name: "fs".to_string(),
                config: McpServerConfig {
                    command: Some("echo-tools".to_string()),
                    args: Vec::new(),
                    env: HashMap::new(),
                    url: None,
                    transport: None,
                    session_id: None,
                    auth: None,
                },
                tools: vec![tool("read"), tool("write")],
                server_info: None,
            })
            .await;
        let health = Arc::new(HealthMonitor::new());
        let dir = tempfile::tempdir().unwrap();
        let scheduler = test_scheduler(dir.path());
        let paths = NcpPaths::new(dir.path().to_path_buf());
        let ctx = InternalMcpContext {
            index: &index,
            health: &health,
            scheduler: &scheduler,
            paths: &paths,
        };
        let result = dispatch_internal_tool("ncp", "status", json!({}), &ctx)
            .await
            .unwrap();
        assert_eq!(result["mcpCount"], 1);
        assert_eq!(result["toolCount"], 2);
    }

    #[tokio::test]
    async fn unknown_internal_tool_suggests_known_ones() {
        let index = SharedIndex::new();
        let health = Arc::new(HealthMonitor::new());
        let dir = tempfile::tempdir().unwrap();
        let scheduler = test_scheduler(dir.path());
        let paths = NcpPaths::new(dir.path().to_path_buf());
        let ctx = InternalMcpContext {
            index: &index,
            health: &health,
            scheduler: &scheduler,
            paths: &paths,
        };
        let err = dispatch_internal_tool("ncp", "bogus", json!({}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, NcpError::McpNotFound { .. }));
    }

    #[tokio::test]
    async fn create_task_then_list_tasks_round_trips() {
        let index = SharedIndex::new();
        let health = Arc::new(HealthMonitor::new());
        let dir = tempfile::tempdir().unwrap();
        let scheduler = test_scheduler(dir.path());
        let paths = NcpPaths::new(dir.path().to_path_buf());
        let ctx = InternalMcpContext {
            index: &index,
            health: &health,
            scheduler: &scheduler,
            paths: &paths,
        };
        let created = dispatch_internal_tool(
            "schedule",
            "create_task",
            json!({"name": "daily-sync", "tool": "fs:sync", "cronExpression": "0 9 * * *"}),
            &ctx,
        )
        .await
        .unwrap();
        assert!(created["id"].is_string());

        let listed = dispatch_internal_tool("schedule", "list_tasks", json!({}), &ctx)
            .await
            .unwrap();
        assert_eq!(listed["tasks"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn add_then_remove_skill_round_trips() {
        let index = SharedIndex::new();
        let health = Arc::new(HealthMonitor::new());
        let dir = tempfile::tempdir().unwrap();
        let scheduler = test_scheduler(dir.path());
        let paths = NcpPaths::new(dir.path().to_path_buf());
        let ctx = InternalMcpContext {
            index: &index,
            health: &health,
            scheduler: &scheduler,
            paths: &paths,
        };
        dispatch_internal_tool(
            "skills",
            "add",
            json!({"name": "release-notes", "prompt": "Summarize the diff as release notes."}),
            &ctx,
        )
        .await
        .unwrap();

        let listed = dispatch_internal_tool("skills", "list", json!({}), &ctx).await.unwrap();
        assert_eq!(listed["skills"].as_array().unwrap().len(), 1);

        dispatch_internal_tool("skills", "remove", json!({"name": "release-notes"}), &ctx)
            .await
            .unwrap();
        let listed = dispatch_internal_tool("skills", "list", json!({}), &ctx).await.unwrap();
        assert!(listed["skills"].as_array().unwrap().is_empty());
    }
}
