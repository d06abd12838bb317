//! Task registry for tracking task attempts and results.
//!
//! The `TaskRegistry` records every task the runner executes: attempt
//! counts, durations, the last result and, for tasks that failed
//! permanently, a dead letter holding the final error.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a task attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum TaskResult {
    /// Task completed successfully
    Success,
    /// Attempt failed and a retry is scheduled
    Retrying(String),
    /// Task failed permanently
    Failed(String),
    /// Task completed and cancelled its continuation
    Cancelled,
    /// Task never ran because its predecessor cancelled or failed
    Skipped,
}

/// Status of a registered task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Unique task id
    pub task_id: String,
    /// Task name (e.g. "add_batch")
    pub task: String,
    /// When the latest attempt started
    pub last_run: Option<DateTime<Utc>>,
    /// Duration of the latest attempt in milliseconds
    pub last_duration_ms: Option<u64>,
    /// Result of the latest attempt
    pub last_result: Option<TaskResult>,
    /// Number of attempts made
    pub attempts: u32,
    /// Whether an attempt is executing
    pub is_running: bool,
}

impl TaskStatus {
    pub fn new(task_id: String, task: String) -> Self {
        Self {
            task_id,
            task,
            last_run: None,
            last_duration_ms: None,
            last_result: None,
            attempts: 0,
            is_running: false,
        }
    }
}

/// A task that failed permanently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeadLetter {
    pub task_id: String,
    pub task: String,
    pub attempts: u32,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Totals across all registered tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistrySummary {
    pub tasks: usize,
    pub succeeded: usize,
    pub cancelled: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Attempts across all tasks, retries included
    pub attempts: u64,
}

/// Registry of task executions.
///
/// # Example
///
/// ```
/// use sync_scheduler::{TaskRegistry, TaskResult};
///
/// let registry = TaskRegistry::new();
/// registry.register("01J0", "add_batch");
///
/// registry.record_start("01J0");
/// assert!(registry.is_running("01J0"));
///
/// registry.record_complete("01J0", TaskResult::Success, 12);
/// assert_eq!(registry.get_status("01J0").unwrap().attempts, 1);
/// ```
#[derive(Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, TaskStatus>>,
    dead_letters: RwLock<Vec<DeadLetter>>,
}

impl TaskRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. Re-registering an id resets its status.
    pub fn register(&self, task_id: &str, task: &str) {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        tasks.insert(
            task_id.to_string(),
            TaskStatus::new(task_id.to_string(), task.to_string()),
        );
    }

    /// Record that an attempt has started.
    pub fn record_start(&self, task_id: &str) {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(status) = tasks.get_mut(task_id) {
            status.is_running = true;
            status.attempts += 1;
            status.last_run = Some(Utc::now());
        }
    }

    /// Record that an attempt has finished.
    pub fn record_complete(&self, task_id: &str, result: TaskResult, duration_ms: u64) {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(status) = tasks.get_mut(task_id) {
            status.is_running = false;
            status.last_duration_ms = Some(duration_ms);
            status.last_result = Some(result);
        }
    }

    /// Record a continuation that was cancelled before it ran.
    pub fn record_skipped(&self, task_id: &str, task: &str) {
        let mut status = TaskStatus::new(task_id.to_string(), task.to_string());
        status.last_result = Some(TaskResult::Skipped);
        self.tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task_id.to_string(), status);
    }

    /// Store the final error of a permanently failed task.
    pub fn record_dead_letter(&self, task_id: &str, error: &str) {
        let Some(status) = self.get_status(task_id) else {
            return;
        };
        self.dead_letters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(DeadLetter {
                task_id: status.task_id,
                task: status.task,
                attempts: status.attempts,
                error: error.to_string(),
                failed_at: Utc::now(),
            });
    }

    /// Get the status of a task.
    pub fn get_status(&self, task_id: &str) -> Option<TaskStatus> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_id)
            .cloned()
    }

    /// Get the status of all tasks.
    pub fn get_all_status(&self) -> Vec<TaskStatus> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Whether an attempt of the task is executing.
    pub fn is_running(&self, task_id: &str) -> bool {
        self.get_status(task_id)
            .map(|s| s.is_running)
            .unwrap_or(false)
    }

    /// All permanently failed tasks, oldest first.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Totals by last result.
    pub fn summary(&self) -> RegistrySummary {
        let tasks = self.tasks.read().unwrap_or_else(PoisonError::into_inner);
        let mut summary = RegistrySummary {
            tasks: tasks.len(),
            ..RegistrySummary::default()
        };
        for status in tasks.values() {
            summary.attempts += u64::from(status.attempts);
            match status.last_result {
                Some(TaskResult::Success) => summary.succeeded += 1,
                Some(TaskResult::Cancelled) => summary.cancelled += 1,
                Some(TaskResult::Skipped) => summary.skipped += 1,
                Some(TaskResult::Failed(_)) => summary.failed += 1,
                Some(TaskResult::Retrying(_)) | None => {}
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_attempts() {
        let registry = TaskRegistry::new();
        registry.register("t1", "save_document");

        registry.record_start("t1");
        registry.record_complete("t1", TaskResult::Retrying("503".into()), 5);
        registry.record_start("t1");
        registry.record_complete("t1", TaskResult::Success, 7);

        let status = registry.get_status("t1").unwrap();
        assert_eq!(status.task, "save_document");
        assert_eq!(status.attempts, 2);
        assert_eq!(status.last_duration_ms, Some(7));
        assert_eq!(status.last_result, Some(TaskResult::Success));
        assert!(!status.is_running);
        assert!(status.last_run.is_some());
    }

    #[test]
    fn test_unknown_task_ignored() {
        let registry = TaskRegistry::new();
        registry.record_start("missing");
        registry.record_complete("missing", TaskResult::Success, 1);
        registry.record_dead_letter("missing", "boom");
        assert!(registry.get_status("missing").is_none());
        assert!(registry.dead_letters().is_empty());
        assert!(!registry.is_running("missing"));
    }

    #[test]
    fn test_dead_letter_keeps_attempts() {
        let registry = TaskRegistry::new();
        registry.register("t1", "update_document");
        for _ in 0..3 {
            registry.record_start("t1");
        }
        registry.record_complete("t1", TaskResult::Failed("exhausted".into()), 3);
        registry.record_dead_letter("t1", "exhausted");

        let letters = registry.dead_letters();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].attempts, 3);
        assert_eq!(letters[0].task, "update_document");
    }

    #[test]
    fn test_summary() {
        let registry = TaskRegistry::new();
        registry.register("a", "add_batch");
        registry.record_start("a");
        registry.record_complete("a", TaskResult::Success, 1);
        registry.register("b", "save_document");
        registry.record_start("b");
        registry.record_complete("b", TaskResult::Cancelled, 1);
        registry.record_skipped("c", "match_alerts");

        let summary = registry.summary();
        assert_eq!(summary.tasks, 3);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.attempts, 2);
    }

    #[test]
    fn test_task_result_serialization() {
        let json = serde_json::to_string(&TaskResult::Failed("boom".into())).unwrap();
        assert_eq!(json, r#"{"result":"failed","detail":"boom"}"#);
    }
}
