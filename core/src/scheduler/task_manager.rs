//! Task / Timing Manager (C13, spec.md §4.13). Persists two JSON files,
//! `tasks.json` and `timings.json`, the way `cache::metadata_cache` persists
//! its own snapshot: whole-file `tmp+fsync+rename` on every mutation. A
//! Timing is a distinct cron expression shared by zero or more tasks and
//! corresponds 1:1 with an OS scheduler entry (spec.md §3's invariant).

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::cache::csv_cache::atomic_write_json;
use crate::scheduler::cron::CronManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Active,
    Paused,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub name: String,
    pub timing_id: String,
    pub cron_expression: String,
    pub tool: String,
    pub parameters: serde_json::Value,
    pub status: TaskStatus,
    pub fire_once: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_executions: Option<u64>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub execution_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_execution_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    pub id: String,
    pub cron_expression: String,
    #[serde(default)]
    pub task_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TasksFile {
    version: u32,
    tasks: HashMap<String, Task>,
}

impl Default for TasksFile {
    fn default() -> Self {
        Self {
            version: 1,
            tasks: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TimingsFile {
    version: u32,
    timings: HashMap<String, Timing>,
}

impl Default for TimingsFile {
    fn default() -> Self {
        Self {
            version: 1,
            timings: HashMap::new(),
        }
    }
}

pub struct TaskManager {
    tasks_path: PathBuf,
    timings_path: PathBuf,
    tasks: TasksFile,
    timings: TimingsFile,
    cron: CronManager,
    /// The command the OS scheduler entry runs for a timing, with `{id}`
    /// substituted for the timing id — e.g. `ncp-mcp-server _timing-fire {id}`.
    worker_command_template: String,
}

impl TaskManager {
    pub fn load(
        tasks_path: PathBuf,
        timings_path: PathBuf,
        cron: CronManager,
        worker_command_template: impl Into<String>,
    ) -> Result<Self> {
        let tasks = read_json_or_default(&tasks_path)?;
        let timings = read_json_or_default(&timings_path)?;
        Ok(Self {
            tasks_path,
            timings_path,
            tasks,
            timings,
            cron,
            worker_command_template: worker_command_template.into(),
        })
    }

    /// Looks up a Timing by its cron expression, or allocates a new one and
    /// registers its single OS scheduler entry (spec.md §4.13).
    pub async fn get_or_create_timing_group(&mut self, cron_expression: &str) -> Result<String> {
        if let Some(existing) = self
            .timings
            .timings
            .values()
            .find(|t| t.cron_expression == cron_expression)
        {
            return Ok(existing.id.clone());
        }

        let id = Uuid::new_v4().to_string();
        let command = self.worker_command_template.replace("{id}", &id);
        self.cron.register(&id, cron_expression, &command).await?;
        self.timings.timings.insert(
            id.clone(),
            Timing {
                id: id.clone(),
                cron_expression: cron_expression.to_string(),
                task_ids: Vec::new(),
            },
        );
        self.save_timings()?;
        Ok(id)
    }

    /// Rejects a duplicate `id` or duplicate `name` (spec.md §4.13), appends
    /// the task to its Timing's `taskIds`, and persists both files.
    pub fn create_task(&mut self, task: Task) -> Result<()> {
        if self.tasks.tasks.contains_key(&task.id) {
            anyhow::bail!("task id '{}' already exists", task.id);
        }
        if self.tasks.tasks.values().any(|t| t.name == task.name) {
            anyhow::bail!("task name '{}' already exists", task.name);
        }
        let timing = self
            .timings
            .timings
            .get_mut(&task.timing_id)
            .context("task references a timing group that does not exist")?;
        timing.task_ids.push(task.id.clone());
        self.tasks.tasks.insert(task.id.clone(), task);
        self.save_timings()?;
        self.save_tasks()?;
        Ok(())
    }

    pub fn get_task(&self, id: &str) -> Option<&Task> {
        self.tasks.tasks.get(id)
    }

    pub fn list_tasks(&self) -> Vec<&Task> {
        self.tasks.tasks.values().collect()
    }

    pub fn get_timing(&self, id: &str) -> Option<&Timing> {
        self.timings.timings.get(id)
    }

    /// Tasks whose `status == active` for a given timing (spec.md §4.13) —
    /// what `TimingExecutor` fans out to child processes on each firing.
    pub fn active_tasks_for_timing(&self, timing_id: &str) -> Vec<Task> {
        let Some(timing) = self.timings.timings.get(timing_id) else {
            return Vec::new();
        };
        timing
            .task_ids
            .iter()
            .filter_map(|id| self.tasks.tasks.get(id))
            .filter(|task| task.status == TaskStatus::Active)
            .cloned()
            .collect()
    }

    pub fn set_status(&mut self, id: &str, status: TaskStatus) -> Result<()> {
        let task = self
            .tasks
            .tasks
            .get_mut(id)
            .context("task not found")?;
        task.status = status;
        self.save_tasks()
    }

    /// Removes `id` from its Timing. If the Timing becomes empty, deletes
    /// the Timing AND its OS entry atomically: a failure to unregister the
    /// OS entry restores the Timing rather than leaving an orphaned
    /// schedule with no backing Timing (spec.md §4.13, §8 invariant 2).
    pub async fn delete_task(&mut self, id: &str) -> Result<bool> {
        let task = self.tasks.tasks.remove(id).context("task not found")?;
        let timing_id = task.timing_id.clone();
        let Some(timing) = self.timings.timings.get_mut(&timing_id) else {
            self.save_tasks()?;
            return Ok(false);
        };
        timing.task_ids.retain(|task_id| task_id != id);
        let became_empty = timing.task_ids.is_empty();

        if !became_empty {
            self.save_timings()?;
            self.save_tasks()?;
            return Ok(false);
        }

        match self.cron.unregister(&timing_id).await {
            Ok(()) => {
                self.timings.timings.remove(&timing_id);
                self.save_timings()?;
                self.save_tasks()?;
                Ok(true)
            }
            Err(err) => {
                // Restore: put the task back, the timing keeps its (still
                // registered) OS entry. No orphan timing, no orphan task.
                if let Some(timing) = self.timings.timings.get_mut(&timing_id) {
                    timing.task_ids.push(id.to_string());
                }
                self.tasks.tasks.insert(id.to_string(), task);
                Err(err).context("failed to unregister OS scheduler entry; task restored")
            }
        }
    }

    /// Increments `executionCount`, records `lastExecutionId`, and
    /// transitions to `completed` for `fireOnce` tasks or once
    /// `executionCount` reaches `maxExecutions` (spec.md §4.13, §8).
    pub fn record_execution(&mut self, task_id: &str, execution_id: &str) -> Result<()> {
        let task = self
            .tasks
            .tasks
            .get_mut(task_id)
            .context("task not found")?;
        task.execution_count += 1;
        task.last_execution_id = Some(execution_id.to_string());
        if task.fire_once || task.max_executions.is_some_and(|max| task.execution_count >= max) {
            task.status = TaskStatus::Completed;
        }
        self.save_tasks()
    }

    fn save_tasks(&self) -> Result<()> {
        atomic_write_json(&self.tasks_path, &self.tasks)
    }

    fn save_timings(&self) -> Result<()> {
        atomic_write_json(&self.timings_path, &self.timings)
    }
}

fn read_json_or_default<T: Default + for<'de> Deserialize<'de>>(path: &PathBuf) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(serde_json::from_str(&raw).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn task(id: &str, name: &str, timing_id: &str) -> Task {
        Task {
            id: id.to_string(),
            name: name.to_string(),
            timing_id: timing_id.to_string(),
            cron_expression: "* * * * *".to_string(),
            tool: "fs:read".to_string(),
            parameters: serde_json::json!({}),
            status: TaskStatus::Active,
            fire_once: false,
            max_executions: None,
            created_at: Utc::now(),
            execution_count: 0,
            last_execution_id: None,
        }
    }

    fn manager(dir: &std::path::Path) -> TaskManager {
        TaskManager::load(
            dir.join("tasks.json"),
            dir.join("timings.json"),
            CronManager::new().unwrap(),
            "ncp-mcp-server _timing-fire {id}".to_string(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn create_task_appends_to_timing_group() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());
        let timing_id = mgr.get_or_create_timing_group("* * * * *").await.unwrap();
        mgr.create_task(task("t1", "hello", &timing_id)).unwrap();
        let timing = mgr.get_timing(&timing_id).unwrap();
        assert!(timing.task_ids.contains(&"t1".to_string()));
    }

    #[tokio::test]
    async fn duplicate_task_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());
        let timing_id = mgr.get_or_create_timing_group("* * * * *").await.unwrap();
        mgr.create_task(task("t1", "hello", &timing_id)).unwrap();
        let err = mgr.create_task(task("t2", "hello", &timing_id));
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn fire_once_task_completes_after_first_execution() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());
        let timing_id = mgr.get_or_create_timing_group("* * * * *").await.unwrap();
        let mut t = task("t1", "hello", &timing_id);
        t.fire_once = true;
        mgr.create_task(t).unwrap();
        mgr.record_execution("t1", "exec-1").unwrap();
        assert_eq!(mgr.get_task("t1").unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn deleting_last_task_removes_timing_group() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());
        let timing_id = mgr.get_or_create_timing_group("* * * * *").await.unwrap();
        mgr.create_task(task("t1", "hello", &timing_id)).unwrap();
        let removed_group = mgr.delete_task("t1").await.unwrap();
        assert!(removed_group);
        assert!(mgr.get_timing(&timing_id).is_none());
    }

    #[tokio::test]
    async fn deleting_one_of_several_tasks_keeps_timing_group() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());
        let timing_id = mgr.get_or_create_timing_group("* * * * *").await.unwrap();
        mgr.create_task(task("t1", "a", &timing_id)).unwrap();
        mgr.create_task(task("t2", "b", &timing_id)).unwrap();
        let removed_group = mgr.delete_task("t1").await.unwrap();
        assert!(!removed_group);
        assert!(mgr.get_timing(&timing_id).is_some());
    }
}
