//! Task runner interpreting pipeline outcomes.
//!
//! The runner is the only place that sleeps between attempts or decides
//! whether a continuation runs. Each task in a chain gets its own id and
//! registry entry; retries reuse the id with an increasing attempt number.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use ulid::Ulid;

use sync_indexing::{Outcome, SyncPipeline, TaskContext};

use crate::config::RunnerConfig;
use crate::error::SchedulerError;
use crate::message::{TaskMessage, TaskRequest, TaskValue};
use crate::registry::{TaskRegistry, TaskResult};
use crate::sink::AlertSink;

/// How a finished task affects its chain.
enum Step {
    Continue(TaskValue),
    Cancel,
}

/// Executes task requests against a [`SyncPipeline`].
pub struct TaskRunner {
    pipeline: Arc<SyncPipeline>,
    alerts: Arc<dyn AlertSink>,
    registry: Arc<TaskRegistry>,
    shutdown_token: CancellationToken,
    config: RunnerConfig,
}

impl TaskRunner {
    /// Create a runner.
    pub fn new(
        pipeline: Arc<SyncPipeline>,
        alerts: Arc<dyn AlertSink>,
        config: RunnerConfig,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        Ok(Self {
            pipeline,
            alerts,
            registry: Arc::new(TaskRegistry::new()),
            shutdown_token: CancellationToken::new(),
            config,
        })
    }

    /// Get the task registry.
    pub fn registry(&self) -> Arc<TaskRegistry> {
        self.registry.clone()
    }

    /// Token that stops the runner. Tasks waiting to retry give up.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Run a request and its continuations.
    ///
    /// Returns the value of the last task that ran, or `None` when a task
    /// cancelled the rest of the chain. Continuations after a cancelled or
    /// failed task are recorded as skipped.
    pub async fn run(&self, request: TaskRequest) -> Result<Option<TaskValue>, SchedulerError> {
        let mut current = Some(request);
        let mut input: Option<TaskValue> = None;

        while let Some(TaskRequest { message, then }) = current.take() {
            match self.run_task(&message, input.as_ref()).await {
                Ok(Step::Continue(value)) => {
                    input = Some(value);
                    current = then.map(|next| *next);
                }
                Ok(Step::Cancel) => {
                    self.skip_chain(then);
                    return Ok(None);
                }
                Err(err) => {
                    self.skip_chain(then);
                    return Err(err);
                }
            }
        }

        Ok(input)
    }

    /// Record every continuation left in a chain as skipped.
    fn skip_chain(&self, mut skipped: Option<Box<TaskRequest>>) {
        while let Some(next) = skipped {
            let task_id = Ulid::new().to_string();
            info!(task_id = %task_id, task = next.message.name(), "Continuation skipped");
            self.registry.record_skipped(&task_id, next.message.name());
            skipped = next.then;
        }
    }

    /// Run many requests, at most `max_concurrency` chains at a time.
    ///
    /// Results are returned in request order.
    pub async fn run_all(
        &self,
        requests: Vec<TaskRequest>,
    ) -> Vec<Result<Option<TaskValue>, SchedulerError>> {
        stream::iter(requests)
            .map(|request| self.run(request))
            .buffered(self.config.max_concurrency)
            .collect()
            .await
    }

    /// Run one task until it succeeds, cancels or fails permanently.
    async fn run_task(
        &self,
        message: &TaskMessage,
        input: Option<&TaskValue>,
    ) -> Result<Step, SchedulerError> {
        let task_id = Ulid::new().to_string();
        let task = message.name();
        self.registry.register(&task_id, task);
        let mut ctx = TaskContext::new(&task_id);

        loop {
            if self.shutdown_token.is_cancelled() {
                return Err(SchedulerError::Shutdown(task_id));
            }

            self.registry.record_start(&task_id);
            let started = Instant::now();
            let outcome = self.execute(&ctx, message, input).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Outcome::Success(value) => {
                    self.registry
                        .record_complete(&task_id, TaskResult::Success, duration_ms);
                    debug!(task_id = %task_id, task, attempt = ctx.attempt, "Task succeeded");
                    return Ok(Step::Continue(value));
                }
                Outcome::CancelDownstream => {
                    self.registry
                        .record_complete(&task_id, TaskResult::Cancelled, duration_ms);
                    debug!(task_id = %task_id, task, "Task cancelled its continuation");
                    return Ok(Step::Cancel);
                }
                Outcome::RetryAfter { delay, error } => {
                    self.registry.record_complete(
                        &task_id,
                        TaskResult::Retrying(error.to_string()),
                        duration_ms,
                    );
                    tokio::select! {
                        _ = self.shutdown_token.cancelled() => {
                            info!(task_id = %task_id, task, "Shutdown while waiting to retry");
                            return Err(SchedulerError::Shutdown(task_id));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    ctx = ctx.next_attempt();
                }
                Outcome::Fatal(source) => {
                    self.registry.record_complete(
                        &task_id,
                        TaskResult::Failed(source.to_string()),
                        duration_ms,
                    );
                    self.registry.record_dead_letter(&task_id, &source.to_string());
                    error!(task_id = %task_id, task, error = %source, "Task dead-lettered");
                    return Err(SchedulerError::TaskFailed {
                        task_id,
                        task: task.to_string(),
                        source,
                    });
                }
            }
        }
    }

    /// Dispatch one attempt to the pipeline.
    async fn execute(
        &self,
        ctx: &TaskContext,
        message: &TaskMessage,
        input: Option<&TaskValue>,
    ) -> Outcome<TaskValue> {
        let pipeline = &self.pipeline;
        match message {
            TaskMessage::AddBatch {
                ids,
                kind,
                force_commit,
            } => pipeline
                .add_batch(ctx, ids, *kind, *force_commit)
                .await
                .map(TaskValue::Batch),
            TaskMessage::AddOrUpdateAggregate {
                payload,
                force_commit,
                freshness_threshold_secs,
            } => pipeline
                .add_or_update_aggregate(
                    ctx,
                    *payload,
                    *force_commit,
                    freshness_threshold_secs.map(Duration::from_secs),
                )
                .await
                .map(TaskValue::Aggregate),
            TaskMessage::AddChildrenBatch { ids, force_commit } => pipeline
                .add_children_batch(ctx, ids, *force_commit)
                .await
                .map(TaskValue::Batch),
            TaskMessage::DeleteBatch {
                ids,
                kind,
                force_commit,
            } => pipeline
                .delete_batch(ctx, ids, *kind, *force_commit)
                .await
                .map(TaskValue::Batch),
            TaskMessage::SaveDocument { kind, id } => pipeline
                .save_record(ctx, *kind, *id)
                .await
                .map(TaskValue::Alert),
            TaskMessage::UpdateDocument {
                kind,
                target,
                fields,
            } => pipeline
                .update_document(ctx, *kind, target, fields)
                .await
                .map(|()| TaskValue::Unit),
            TaskMessage::MatchAlerts => {
                match input {
                    Some(TaskValue::Alert(alert)) => self.alerts.deliver(alert.clone()).await,
                    _ => debug!(task_id = %ctx.task_id, "No saved document to match"),
                }
                Outcome::Success(TaskValue::Unit)
            }
        }
    }
}
