//! Serializable task messages.
//!
//! One JSON object per task, tagged by `"task"`. A request may carry a
//! follow-up in `"then"` that runs with the previous task's result unless
//! that task cancels it:
//!
//! ```json
//! {"task": "save_document", "kind": "audio", "id": 9, "then": {"task": "match_alerts"}}
//! ```

use std::io::BufRead;

use serde::{Deserialize, Serialize};

use sync_indexing::{AggregatePayload, AggregateStatus, AlertForward, BatchReport};
use sync_types::{DocumentRef, EntityId, EntityKind, Fields};

use crate::error::SchedulerError;

/// A unit of work for the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum TaskMessage {
    /// Convert and write records of one kind to the legacy backend
    AddBatch {
        ids: Vec<EntityId>,
        kind: EntityKind,
        #[serde(default)]
        force_commit: bool,
    },
    /// Re-index a docket and its documents unless it is fresh
    AddOrUpdateAggregate {
        #[serde(default)]
        payload: Option<AggregatePayload>,
        #[serde(default)]
        force_commit: bool,
        /// Overrides the pipeline's freshness threshold for this task
        #[serde(default, skip_serializing_if = "Option::is_none")]
        freshness_threshold_secs: Option<u64>,
    },
    /// Write documents of one docket with shared parent fields
    AddChildrenBatch {
        ids: Vec<EntityId>,
        #[serde(default)]
        force_commit: bool,
    },
    /// Delete documents from the legacy backend
    DeleteBatch {
        ids: Vec<EntityId>,
        kind: EntityKind,
        #[serde(default)]
        force_commit: bool,
    },
    /// Save one record to the nested backend
    SaveDocument { kind: EntityKind, id: EntityId },
    /// Update named fields of a nested-backend document
    UpdateDocument {
        kind: EntityKind,
        target: DocumentRef,
        fields: Fields,
    },
    /// Hand a newly created document to alert matching
    MatchAlerts,
}

impl TaskMessage {
    /// Task name as it appears in the `"task"` tag.
    pub fn name(&self) -> &'static str {
        match self {
            TaskMessage::AddBatch { .. } => "add_batch",
            TaskMessage::AddOrUpdateAggregate { .. } => "add_or_update_aggregate",
            TaskMessage::AddChildrenBatch { .. } => "add_children_batch",
            TaskMessage::DeleteBatch { .. } => "delete_batch",
            TaskMessage::SaveDocument { .. } => "save_document",
            TaskMessage::UpdateDocument { .. } => "update_document",
            TaskMessage::MatchAlerts => "match_alerts",
        }
    }
}

/// A task message with an optional continuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    #[serde(flatten)]
    pub message: TaskMessage,

    /// Runs after this task succeeds, unless the task cancels it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub then: Option<Box<TaskRequest>>,
}

impl TaskRequest {
    pub fn new(message: TaskMessage) -> Self {
        Self {
            message,
            then: None,
        }
    }

    /// Chain a follow-up after the last request of this chain.
    pub fn then(mut self, next: TaskRequest) -> Self {
        self.then = Some(Box::new(match self.then.take() {
            Some(existing) => existing.then(next),
            None => next,
        }));
        self
    }

    /// Number of tasks in the chain.
    pub fn chain_len(&self) -> usize {
        1 + self.then.as_ref().map_or(0, |next| next.chain_len())
    }
}

impl From<TaskMessage> for TaskRequest {
    fn from(message: TaskMessage) -> Self {
        Self::new(message)
    }
}

/// Success value of a task, passed to its continuation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TaskValue {
    Batch(BatchReport),
    Aggregate(AggregateStatus),
    Alert(AlertForward),
    Unit,
}

impl TaskValue {
    /// Documents written to the legacy backend by a batch or aggregate task.
    pub fn documents_written(&self) -> usize {
        match self {
            TaskValue::Batch(report) | TaskValue::Aggregate(AggregateStatus::Reindexed(report)) => {
                report.written
            }
            _ => 0,
        }
    }
}

/// Parse task requests, one JSON object per line.
///
/// Blank lines and lines starting with `#` are ignored.
pub fn parse_task_lines(reader: impl BufRead) -> Result<Vec<TaskRequest>, SchedulerError> {
    let mut requests = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let request = serde_json::from_str(trimmed).map_err(|e| SchedulerError::Parse {
            line: index + 1,
            message: e.to_string(),
        })?;
        requests.push(request);
    }
    Ok(requests)
}
