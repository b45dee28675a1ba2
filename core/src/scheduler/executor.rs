//! Timing Executor (C14, spec.md §4.14) — the isolation core. Invoked by the
//! OS-scheduler shim with a `timingId`; spawns one child process per active
//! task so that one task's crash, infinite loop, or leak cannot starve its
//! siblings. The parent never executes a tool in-process.

use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use tokio::process::Command;
use tokio::task::JoinSet;
use tracing::warn;

use crate::scheduler::task_manager::Task;

/// Hard per-child timeout (spec.md §4.14: default 10 minutes).
const DEFAULT_CHILD_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// Grace period between the graceful stop signal and the hard kill.
const KILL_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct TaskExecutionResult {
    pub task_id: String,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
pub struct TimingExecutionSummary {
    pub executed_tasks: usize,
    pub successful_tasks: usize,
    pub failed_tasks: usize,
    pub results: Vec<TaskExecutionResult>,
}

pub struct TimingExecutor {
    /// The worker binary, e.g. the `ncp-mcp-server` executable's own path.
    worker_binary: String,
    child_timeout: Duration,
}

impl TimingExecutor {
    pub fn new(worker_binary: impl Into<String>) -> Self {
        Self {
            worker_binary: worker_binary.into(),
            child_timeout: DEFAULT_CHILD_TIMEOUT,
        }
    }

    pub fn with_child_timeout(mut self, timeout: Duration) -> Self {
        self.child_timeout = timeout;
        self
    }

    /// Runs every active task for one timing firing, collecting all results
    /// with settle-all semantics: no task's failure cancels or influences
    /// any other (spec.md §4.14 step 3).
    pub async fn fire(&self, tasks: Vec<Task>) -> TimingExecutionSummary {
        let mut joinset: JoinSet<TaskExecutionResult> = JoinSet::new();
        for task in tasks {
            let worker_binary = self.worker_binary.clone();
            let child_timeout = self.child_timeout;
            joinset.spawn(async move {
                run_one_task(&worker_binary, &task, child_timeout).await
            });
        }

        let mut summary = TimingExecutionSummary::default();
        while let Some(joined) = joinset.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(join_err) => TaskExecutionResult {
                    task_id: "unknown".to_string(),
                    success: false,
                    exit_code: None,
                    timed_out: false,
                    error: Some(format!("worker task panicked: {join_err}")),
                },
            };
            summary.executed_tasks += 1;
            if result.success {
                summary.successful_tasks += 1;
            } else {
                summary.failed_tasks += 1;
            }
            summary.results.push(result);
        }
        summary
    }
}

/// Spawns `ncp _task-execute <taskId>` in its own process group (so a hard
/// kill takes any grandchildren with it) and enforces the per-child timeout
/// with a graceful-stop-then-kill sequence (spec.md §4.14 step 5).
async fn run_one_task(worker_binary: &str, task: &Task, timeout: Duration) -> TaskExecutionResult {
    let spawn_result = spawn_worker(worker_binary, &task.id).await;
    let mut child = match spawn_result {
        Ok(child) => child,
        Err(err) => {
            return TaskExecutionResult {
                task_id: task.id.clone(),
                success: false,
                exit_code: None,
                timed_out: false,
                error: Some(format!("failed to spawn worker: {err}")),
            };
        }
    };

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => TaskExecutionResult {
            task_id: task.id.clone(),
            success: status.success(),
            exit_code: status.code(),
            timed_out: false,
            error: None,
        },
        Ok(Err(err)) => TaskExecutionResult {
            task_id: task.id.clone(),
            success: false,
            exit_code: None,
            timed_out: false,
            error: Some(format!("waiting for worker failed: {err}")),
        },
        Err(_elapsed) => {
            warn!(task = %task.id, "worker exceeded timeout, sending graceful stop");
            send_graceful_stop(&child);
            let grace_result = tokio::time::timeout(KILL_GRACE, child.wait()).await;
            if grace_result.is_err() {
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
            TaskExecutionResult {
                task_id: task.id.clone(),
                success: false,
                exit_code: None,
                timed_out: true,
                error: Some("task exceeded the execution timeout".to_string()),
            }
        }
    }
}

async fn spawn_worker(worker_binary: &str, task_id: &str) -> Result<tokio::process::Child> {
    let mut cmd = Command::new(worker_binary);
    cmd.arg("_task-execute").arg(task_id);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        unsafe {
            cmd.pre_exec(|| {
                let _ = libc::setpgid(0, 0);
                Ok(())
            });
        }
    }
    cmd.spawn().context("spawning task worker process")
}

/// Sends `SIGTERM` on unix (the closest this crate has to a portable
/// "graceful stop" signal for an arbitrary child); Windows has no
/// equivalent, so it falls straight through to the hard kill after
/// `KILL_GRACE` elapses.
#[cfg(unix)]
fn send_graceful_stop(child: &tokio::process::Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn send_graceful_stop(_child: &tokio::process::Child) {}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::scheduler::task_manager::TaskStatus;
    use chrono::Utc;

    fn task(id: &str, tool: &str) -> Task {
        Task {
            id: id.to_string(),
            name: id.to_string(),
            timing_id: "timing-1".to_string(),
            cron_expression: "* * * * *".to_string(),
            tool: tool.to_string(),
            parameters: serde_json::json!({}),
            status: TaskStatus::Active,
            fire_once: false,
            max_executions: None,
            created_at: Utc::now(),
            execution_count: 0,
            last_execution_id: None,
        }
    }

    /// One sibling exiting non-zero must not prevent the others from
    /// reporting success (spec.md §8 scenario C: isolation).
    #[tokio::test]
    async fn one_failing_sibling_does_not_affect_others() {
        let executor = TimingExecutor::new("true").with_child_timeout(Duration::from_secs(5));
        let tasks = vec![task("t1", "echo:hello"), task("t2", "echo:world")];
        let summary = executor.fire(tasks).await;
        assert_eq!(summary.executed_tasks, 2);
        assert_eq!(summary.successful_tasks, 2);
    }

    #[tokio::test]
    async fn nonexistent_worker_binary_reports_failure_not_panic() {
        let executor = TimingExecutor::new("definitely-not-a-real-binary-xyz");
        let summary = executor.fire(vec![task("t1", "echo:hello")]).await;
        assert_eq!(summary.failed_tasks, 1);
        assert!(summary.results[0].error.is_some());
    }
}
