//! The scheduler's two worker entry points (spec.md §4.14): `_timing-fire`,
//! invoked by the OS scheduler for a `timingId` and responsible for fanning
//! a firing out to one child process per active task, and `_task-execute`,
//! the per-task child each of those fan-outs spawns. Grounded on the
//! teacher's own pattern of a single binary dispatching on a leading
//! subcommand string to a handful of `run_main`-shaped functions.

use ncp_core::NcpError;
use ncp_core::NcpPaths;
use ncp_core::Orchestrator;
use ncp_core::scheduler::CronManager;
use ncp_core::scheduler::ExecutionRecorder;
use ncp_core::scheduler::ExecutionStatus;
use ncp_core::scheduler::TaskManager;
use ncp_core::scheduler::TimingExecutor;
use tracing::error;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

/// Exit code contract for `_task-execute` (spec.md §6): 0 success, 1
/// execution failure, 2 invalid invocation, 3 orchestrator failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskExecuteOutcome {
    Success,
    ExecutionFailure,
    InvalidInvocation,
    OrchestratorFailure,
}

impl TaskExecuteOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            TaskExecuteOutcome::Success => 0,
            TaskExecuteOutcome::ExecutionFailure => 1,
            TaskExecuteOutcome::InvalidInvocation => 2,
            TaskExecuteOutcome::OrchestratorFailure => 3,
        }
    }
}

fn task_manager(paths: &NcpPaths, worker_binary: &str) -> anyhow::Result<TaskManager> {
    let cron = CronManager::new()?;
    TaskManager::load(
        paths.tasks_json(),
        paths.timings_json(),
        cron,
        format!("{worker_binary} _timing-fire {{id}}"),
    )
}

/// Runs exactly one task in this process, in its own process group (the
/// caller, `TimingExecutor`, is responsible for the isolation; this function
/// just does the work once invoked). Writes the execution record at start
/// and completion regardless of outcome (spec.md §4.15).
pub async fn run_task_execute(
    paths: &NcpPaths,
    profile_name: &str,
    worker_binary: &str,
    task_id: &str,
) -> TaskExecuteOutcome {
    let mut manager = match task_manager(paths, worker_binary) {
        Ok(manager) => manager,
        Err(err) => {
            error!(error = %err, "failed to load task manager");
            return TaskExecuteOutcome::InvalidInvocation;
        }
    };
    let Some(task) = manager.get_task(task_id).cloned() else {
        error!(task = %task_id, "no such task");
        return TaskExecuteOutcome::InvalidInvocation;
    };

    let recorder = ExecutionRecorder::new(paths);
    let execution_id = Uuid::new_v4().to_string();
    let record = match recorder.start_execution(
        &execution_id,
        &task.id,
        &task.name,
        &task.tool,
        task.parameters.clone(),
    ) {
        Ok(record) => record,
        Err(err) => {
            error!(error = %err, "failed to write execution start record");
            return TaskExecuteOutcome::InvalidInvocation;
        }
    };

    let orchestrator = match Orchestrator::initialize(paths.clone(), profile_name).await {
        Ok(orchestrator) => orchestrator,
        Err(err) => {
            error!(error = %err, "failed to initialize orchestrator for task execution");
            let _ = recorder.complete_execution(
                record,
                ExecutionStatus::Failure,
                None,
                Some(err.to_string()),
            );
            return TaskExecuteOutcome::OrchestratorFailure;
        }
    };

    let outcome = orchestrator.run(&task.tool, task.parameters.clone(), None).await;
    let result = match &outcome {
        Ok(success) => {
            let text = success
                .content
                .iter()
                .filter_map(|block| match block {
                    mcp_types::ContentBlock::Text { text } => Some(text.clone()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n");
            Some(serde_json::Value::String(text))
        }
        Err(_) => None,
    };
    let error_message = match &outcome {
        Ok(_) => None,
        Err(err) => Some(err.to_string()),
    };
    let status = if outcome.is_ok() { ExecutionStatus::Success } else { ExecutionStatus::Failure };

    if let Err(err) = recorder.complete_execution(record, status, result, error_message) {
        warn!(error = %err, "failed to write execution completion record");
    }
    if let Err(err) = manager.record_execution(&task.id, &execution_id) {
        warn!(error = %err, "failed to update task bookkeeping after execution");
    }
    orchestrator.cleanup().await;

    match outcome {
        Ok(_) => {
            info!(task = %task_id, "task execution succeeded");
            TaskExecuteOutcome::Success
        }
        Err(NcpError::ValidationError { .. }) | Err(NcpError::McpNotFound { .. }) => {
            TaskExecuteOutcome::InvalidInvocation
        }
        Err(_) => TaskExecuteOutcome::ExecutionFailure,
    }
}

/// The OS scheduler shim for one timing (spec.md §4.14 steps 1-3): loads the
/// active tasks for `timingId` and fans them out to one `_task-execute`
/// child process per task, never executing a tool in this process.
pub async fn run_timing_fire(paths: &NcpPaths, worker_binary: &str, timing_id: &str) -> i32 {
    let manager = match task_manager(paths, worker_binary) {
        Ok(manager) => manager,
        Err(err) => {
            error!(error = %err, "failed to load task manager");
            return 1;
        }
    };
    let tasks = manager.active_tasks_for_timing(timing_id);
    if tasks.is_empty() {
        info!(timing = %timing_id, "no active tasks for this firing");
        return 0;
    }

    let executor = TimingExecutor::new(worker_binary.to_string());
    let summary = executor.fire(tasks).await;
    info!(
        timing = %timing_id,
        executed = summary.executed_tasks,
        succeeded = summary.successful_tasks,
        failed = summary.failed_tasks,
        "timing fired"
    );
    if summary.failed_tasks == 0 { 0 } else { 1 }
}
