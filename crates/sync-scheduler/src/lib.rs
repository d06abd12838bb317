//! Task runner for docket-sync pipeline tasks.
//!
//! The pipeline reports what should happen after each attempt as an
//! `Outcome`. This crate interprets those outcomes: it sleeps and re-runs
//! tasks that asked for a retry, dead-letters tasks that failed for good,
//! and runs or skips continuations.
//!
//! # Example
//!
//! ```ignore
//! use sync_scheduler::{AlertOutbox, RunnerConfig, TaskMessage, TaskRequest, TaskRunner};
//!
//! let outbox = Arc::new(AlertOutbox::new());
//! let runner = TaskRunner::new(pipeline, outbox.clone(), RunnerConfig::default())?;
//!
//! // Save a recording, then match it against saved alert queries
//! let request = TaskRequest::new(TaskMessage::SaveDocument { kind: EntityKind::Audio, id: 9 })
//!     .then(TaskMessage::MatchAlerts.into());
//! runner.run(request).await?;
//!
//! println!("{:?}", runner.registry().summary());
//! ```

mod config;
mod error;
mod message;
mod registry;
mod runner;
mod sink;

pub use config::RunnerConfig;
pub use error::SchedulerError;
pub use message::{parse_task_lines, TaskMessage, TaskRequest, TaskValue};
pub use registry::{DeadLetter, RegistrySummary, TaskRegistry, TaskResult, TaskStatus};
pub use runner::TaskRunner;
pub use sink::{AlertOutbox, AlertSink};
