//! Error types for the scheduler crate.

use sync_indexing::SyncError;
use thiserror::Error;

/// Errors that can occur while running tasks.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A task failed permanently and was dead-lettered
    #[error("Task {task_id} ({task}) failed: {source}")]
    TaskFailed {
        task_id: String,
        task: String,
        #[source]
        source: SyncError,
    },

    /// The runner was shut down while a task waited to retry
    #[error("Runner shut down before task {0} completed")]
    Shutdown(String),

    /// A task message could not be parsed
    #[error("Invalid task message on line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Reading task messages failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid runner configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SchedulerError {
    /// The underlying pipeline error, for failed tasks.
    pub fn sync_error(&self) -> Option<&SyncError> {
        match self {
            SchedulerError::TaskFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}
