//! Execution Recorder (C15, spec.md §4.15). A `running` JSON detail file is
//! written at start; the CSV summary row is written only on completion, so a
//! process that crashes mid-execution leaves no CSV evidence of a completed
//! run (spec.md §9: "the CSV is append-only and written on completion").

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use chrono::DateTime;
use chrono::Duration as ChronoDuration;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::cache::csv_cache::atomic_write_json;
use crate::paths::NcpPaths;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub task_id: String,
    pub name: String,
    pub tool: String,
    pub parameters: serde_json::Value,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct ExecutionRecorder<'a> {
    paths: &'a NcpPaths,
}

const SUMMARY_HEADER: [&str; 8] = [
    "executionId",
    "jobId",
    "jobName",
    "tool",
    "startedAt",
    "duration",
    "status",
    "errorMessage",
];

impl<'a> ExecutionRecorder<'a> {
    pub fn new(paths: &'a NcpPaths) -> Self {
        Self { paths }
    }

    /// Writes the initial `running` detail file. No CSV row yet.
    pub fn start_execution(
        &self,
        execution_id: &str,
        task_id: &str,
        name: &str,
        tool: &str,
        parameters: serde_json::Value,
    ) -> Result<ExecutionRecord> {
        let record = ExecutionRecord {
            execution_id: execution_id.to_string(),
            task_id: task_id.to_string(),
            name: name.to_string(),
            tool: tool.to_string(),
            parameters,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            status: ExecutionStatus::Running,
            result: None,
            error: None,
        };
        self.write_detail(&record)?;
        Ok(record)
    }

    /// Finalizes the detail file and appends one CSV summary row
    /// (spec.md §4.15).
    pub fn complete_execution(
        &self,
        mut record: ExecutionRecord,
        status: ExecutionStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<ExecutionRecord> {
        let completed_at = Utc::now();
        record.duration_ms = Some((completed_at - record.started_at).num_milliseconds());
        record.completed_at = Some(completed_at);
        record.status = status;
        record.result = result;
        record.error = error;
        self.write_detail(&record)?;
        self.append_summary_row(&record)?;
        Ok(record)
    }

    fn write_detail(&self, record: &ExecutionRecord) -> Result<()> {
        let path = self.paths.execution_result_json(&record.execution_id);
        atomic_write_json(&path, record)
    }

    fn append_summary_row(&self, record: &ExecutionRecord) -> Result<()> {
        let path = self.paths.executions_summary_csv();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("creating executions directory")?;
        }
        let header_needed = !path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if header_needed {
            writer.write_record(SUMMARY_HEADER)?;
        }
        writer.write_record([
            record.execution_id.as_str(),
            record.task_id.as_str(),
            record.name.as_str(),
            record.tool.as_str(),
            &record.started_at.to_rfc3339(),
            &record.duration_ms.unwrap_or_default().to_string(),
            status_str(record.status),
            record.error.as_deref().unwrap_or(""),
        ])?;
        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|err| anyhow::anyhow!("flushing execution summary CSV: {err}"))?;
        file.sync_all().context("fsyncing execution summary CSV")
    }

    /// Every complete row in `summary.csv`, newest first. Tolerates a
    /// trailing unterminated line from a crash mid-append, same as
    /// [`crate::cache::CsvCache`].
    pub fn query_executions(&self) -> Result<Vec<SummaryRow>> {
        let path = self.paths.executions_summary_csv();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read(&path).context("reading execution summary CSV")?;
        let text = String::from_utf8_lossy(&raw);
        let complete = match text.rfind('\n') {
            Some(last_newline) => &text[..=last_newline],
            None => return Ok(Vec::new()),
        };
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(complete.as_bytes());
        let mut rows: Vec<SummaryRow> = reader
            .deserialize()
            .filter_map(|result: csv::Result<SummaryRow>| result.ok())
            .collect();
        rows.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(rows)
    }

    /// Deletes detail JSON files older than `max_age_days`, then bounds the
    /// remaining count per task to `max_per_task` if given (spec.md §4.15).
    pub fn cleanup_old_executions(
        &self,
        max_age_days: i64,
        max_per_task: Option<usize>,
    ) -> Result<CleanupOutcome> {
        let results_dir = self.paths.executions_dir().join("results");
        let mut outcome = CleanupOutcome::default();
        if !results_dir.exists() {
            return Ok(outcome);
        }
        let cutoff = Utc::now() - ChronoDuration::days(max_age_days);
        let mut by_task: HashMap<String, Vec<(DateTime<Utc>, PathBuf)>> = HashMap::new();

        for entry in std::fs::read_dir(&results_dir).context("reading executions/results")? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    outcome.errors.push(err.to_string());
                    continue;
                }
            };
            let path = entry.path();
            let record: ExecutionRecord = match std::fs::read_to_string(&path)
                .ok()
                .and_then(|raw| serde_json::from_str(&raw).ok())
            {
                Some(record) => record,
                None => continue,
            };
            if record.started_at < cutoff {
                if std::fs::remove_file(&path).is_ok() {
                    outcome.deleted_count += 1;
                } else {
                    outcome.errors.push(format!("failed to delete {}", path.display()));
                }
                continue;
            }
            by_task
                .entry(record.task_id.clone())
                .or_default()
                .push((record.started_at, path));
        }

        if let Some(max_per_task) = max_per_task {
            for mut entries in by_task.into_values() {
                entries.sort_by(|a, b| b.0.cmp(&a.0));
                for (_, path) in entries.into_iter().skip(max_per_task) {
                    if std::fs::remove_file(&path).is_ok() {
                        outcome.deleted_count += 1;
                    } else {
                        outcome.errors.push(format!("failed to delete {}", path.display()));
                    }
                }
            }
        }

        Ok(outcome)
    }
}

fn status_str(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Running => "running",
        ExecutionStatus::Success => "success",
        ExecutionStatus::Failure => "failure",
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRow {
    pub execution_id: String,
    pub job_id: String,
    pub job_name: String,
    pub tool: String,
    pub started_at: DateTime<Utc>,
    pub duration: i64,
    pub status: String,
    #[serde(default)]
    pub error_message: String,
}

#[derive(Debug, Default)]
pub struct CleanupOutcome {
    pub deleted_count: usize,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn completion_writes_exactly_one_csv_row() {
        let dir = tempfile::tempdir().unwrap();
        let paths = NcpPaths::new(dir.path().to_path_buf());
        let recorder = ExecutionRecorder::new(&paths);
        let record = recorder
            .start_execution("exec-1", "t1", "hello-task", "echo:hello", serde_json::json!({}))
            .unwrap();
        recorder
            .complete_execution(record, ExecutionStatus::Success, Some(serde_json::json!("ok")), None)
            .unwrap();
        let rows = recorder.query_executions().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "success");
    }

    #[test]
    fn no_csv_row_is_written_until_completion() {
        let dir = tempfile::tempdir().unwrap();
        let paths = NcpPaths::new(dir.path().to_path_buf());
        let recorder = ExecutionRecorder::new(&paths);
        recorder
            .start_execution("exec-1", "t1", "hello-task", "echo:hello", serde_json::json!({}))
            .unwrap();
        assert!(recorder.query_executions().unwrap().is_empty());
    }

    #[test]
    fn query_executions_sorts_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let paths = NcpPaths::new(dir.path().to_path_buf());
        let recorder = ExecutionRecorder::new(&paths);
        for id in ["exec-1", "exec-2", "exec-3"] {
            let record = recorder
                .start_execution(id, "t1", "hello-task", "echo:hello", serde_json::json!({}))
                .unwrap();
            recorder
                .complete_execution(record, ExecutionStatus::Success, None, None)
                .unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        let rows = recorder.query_executions().unwrap();
        assert_eq!(rows[0].execution_id, "exec-3");
        assert_eq!(rows[2].execution_id, "exec-1");
    }

    #[test]
    fn cleanup_bounds_entries_per_task() {
        let dir = tempfile::tempdir().unwrap();
        let paths = NcpPaths::new(dir.path().to_path_buf());
        let recorder = ExecutionRecorder::new(&paths);
        for id in ["exec-1", "exec-2", "exec-3"] {
            let record = recorder
                .start_execution(id, "t1", "hello-task", "echo:hello", serde_json::json!({}))
                .unwrap();
            recorder
                .complete_execution(record, ExecutionStatus::Success, None, None)
                .unwrap();
        }
        let outcome = recorder.cleanup_old_executions(7, Some(1)).unwrap();
        assert_eq!(outcome.deleted_count, 2);
    }
}
