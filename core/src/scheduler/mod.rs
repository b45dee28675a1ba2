//! The Scheduler: persistent scheduled tasks grouped by cron timing, OS
//! registration, fan-out execution with per-task process isolation, and
//! execution recording (spec.md §1's subsystem 3, components C11-C15).

pub mod cron;
pub mod executor;
pub mod nl_schedule;
pub mod recorder;
pub mod task_manager;

pub use cron::CronManager;
pub use executor::TimingExecutionSummary;
pub use executor::TimingExecutor;
pub use nl_schedule::ParsedSchedule;
pub use nl_schedule::parse_natural_language_schedule;
pub use recorder::ExecutionRecorder;
pub use recorder::ExecutionRecord;
pub use recorder::ExecutionStatus;
pub use task_manager::Task;
pub use task_manager::TaskManager;
pub use task_manager::TaskStatus;
pub use task_manager::Timing;
