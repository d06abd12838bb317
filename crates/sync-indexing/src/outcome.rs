//! Task outcomes and retry policies.
//!
//! Pipeline entry points never sleep or retry themselves. They return an
//! [`Outcome`] and the scheduler decides what to do with it: run the
//! continuation, re-run the task after a delay, record a permanent failure,
//! or drop the continuation.

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use sync_types::RetrySettings;
use tracing::{error, warn};

use crate::error::SyncError;

/// Identity and attempt number of a running task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContext {
    pub task_id: String,
    /// 1 on the first run
    pub attempt: u32,
}

impl TaskContext {
    /// Context of a task's first attempt.
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            attempt: 1,
        }
    }

    /// Context of the next attempt of the same task.
    pub fn next_attempt(&self) -> Self {
        Self {
            task_id: self.task_id.clone(),
            attempt: self.attempt + 1,
        }
    }
}

/// What a task asks the scheduler to do next.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// Done; continuations may run with this value
    Success(T),
    /// Transient failure; re-run the same task after `delay`
    RetryAfter { delay: Duration, error: SyncError },
    /// Permanent failure
    Fatal(SyncError),
    /// Done, and the linked continuation must not run
    CancelDownstream,
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// The success value, if any.
    pub fn success(self) -> Option<T> {
        match self {
            Outcome::Success(value) => Some(value),
            _ => None,
        }
    }

    /// Transform the success value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::RetryAfter { delay, error } => Outcome::RetryAfter { delay, error },
            Outcome::Fatal(error) => Outcome::Fatal(error),
            Outcome::CancelDownstream => Outcome::CancelDownstream,
        }
    }

    /// Short label for logs and registry entries.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::RetryAfter { .. } => "retry",
            Outcome::Fatal(_) => "fatal",
            Outcome::CancelDownstream => "cancelled",
        }
    }
}

/// Exponential backoff limited to a number of attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundedRetry {
    /// Total runs allowed, including the first
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
}

impl Default for BoundedRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_secs(5),
            multiplier: 2.0,
            max_interval: Duration::from_secs(60),
        }
    }
}

/// How a task reacts to transient failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryPolicy {
    /// Retry forever with the same delay
    Fixed(Duration),
    /// Retry with growing delays, then give up
    Bounded(BoundedRetry),
}

impl RetryPolicy {
    /// Policy for batch tasks.
    pub fn batch(settings: &RetrySettings) -> Self {
        RetryPolicy::Fixed(Duration::from_secs(settings.batch_delay_secs))
    }

    /// Policy for single-document tasks.
    pub fn single(settings: &RetrySettings) -> Self {
        RetryPolicy::Bounded(BoundedRetry {
            max_attempts: settings.max_attempts,
            initial_interval: Duration::from_secs(settings.initial_interval_secs),
            multiplier: settings.multiplier,
            max_interval: Duration::from_secs(settings.max_interval_secs),
        })
    }

    /// Delay before the run following failed attempt `attempt` (1-based),
    /// or `None` when no attempts remain.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        match self {
            RetryPolicy::Fixed(delay) => Some(*delay),
            RetryPolicy::Bounded(bounded) => {
                if attempt >= bounded.max_attempts {
                    return None;
                }
                let mut backoff = ExponentialBackoff {
                    current_interval: bounded.initial_interval,
                    initial_interval: bounded.initial_interval,
                    randomization_factor: 0.0,
                    multiplier: bounded.multiplier,
                    max_interval: bounded.max_interval,
                    max_elapsed_time: None,
                    ..Default::default()
                };
                let mut delay = None;
                for _ in 0..attempt.max(1) {
                    delay = backoff.next_backoff();
                }
                delay
            }
        }
    }

    /// Turn a failure into an outcome.
    ///
    /// Permanent errors are fatal immediately. Transient errors retry while
    /// the policy allows, then become [`SyncError::RetriesExhausted`].
    pub fn on_error<T>(&self, ctx: &TaskContext, error: SyncError) -> Outcome<T> {
        if !error.is_transient() {
            error!(task_id = %ctx.task_id, error = %error, "Task failed permanently");
            return Outcome::Fatal(error);
        }

        match self.delay_after(ctx.attempt) {
            Some(delay) => {
                warn!(
                    task_id = %ctx.task_id,
                    attempt = ctx.attempt,
                    error = %error,
                    retry_in_ms = delay.as_millis() as u64,
                    "Task failed, retrying"
                );
                Outcome::RetryAfter { delay, error }
            }
            None => {
                error!(
                    task_id = %ctx.task_id,
                    attempts = ctx.attempt,
                    error = %error,
                    "Max retries exceeded"
                );
                Outcome::Fatal(SyncError::RetriesExhausted {
                    attempts: ctx.attempt,
                    source: Box::new(error),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_backend::BackendError;

    fn transport() -> SyncError {
        BackendError::from_status(503, "unavailable").into()
    }

    #[test]
    fn test_fixed_never_gives_up() {
        let policy = RetryPolicy::Fixed(Duration::from_secs(30));
        assert_eq!(policy.delay_after(1), Some(Duration::from_secs(30)));
        assert_eq!(policy.delay_after(500), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_bounded_schedule() {
        let policy = RetryPolicy::Bounded(BoundedRetry::default());
        assert_eq!(policy.delay_after(1), Some(Duration::from_secs(5)));
        assert_eq!(policy.delay_after(2), Some(Duration::from_secs(10)));
        assert_eq!(policy.delay_after(3), None);
    }

    #[test]
    fn test_bounded_caps_interval() {
        let policy = RetryPolicy::Bounded(BoundedRetry {
            max_attempts: 10,
            initial_interval: Duration::from_secs(5),
            multiplier: 10.0,
            max_interval: Duration::from_secs(60),
        });
        assert_eq!(policy.delay_after(3), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_on_error_transient_retries() {
        let policy = RetryPolicy::Bounded(BoundedRetry::default());
        let ctx = TaskContext::new("t1");
        let outcome: Outcome<()> = policy.on_error(&ctx, transport());
        assert!(matches!(
            outcome,
            Outcome::RetryAfter { delay, .. } if delay == Duration::from_secs(5)
        ));
    }

    #[test]
    fn test_on_error_last_attempt_exhausts() {
        let policy = RetryPolicy::Bounded(BoundedRetry::default());
        let ctx = TaskContext::new("t1").next_attempt().next_attempt();
        assert_eq!(ctx.attempt, 3);

        let outcome: Outcome<()> = policy.on_error(&ctx, transport());
        assert!(matches!(
            outcome,
            Outcome::Fatal(SyncError::RetriesExhausted { attempts: 3, .. })
        ));
    }

    #[test]
    fn test_on_error_permanent_is_fatal() {
        let policy = RetryPolicy::Fixed(Duration::from_secs(30));
        let error: SyncError = BackendError::InvalidResponse("html".into()).into();
        let outcome: Outcome<()> = policy.on_error(&TaskContext::new("t1"), error);
        assert!(matches!(outcome, Outcome::Fatal(SyncError::Backend(_))));
    }

    #[test]
    fn test_policies_from_settings() {
        let settings = RetrySettings::default();
        assert_eq!(
            RetryPolicy::batch(&settings),
            RetryPolicy::Fixed(Duration::from_secs(30))
        );
        assert_eq!(
            RetryPolicy::single(&settings),
            RetryPolicy::Bounded(BoundedRetry::default())
        );
    }

    #[test]
    fn test_outcome_map() {
        let outcome: Outcome<u32> = Outcome::Success(2);
        assert_eq!(outcome.map(|n| n * 2).success(), Some(4));

        let cancelled: Outcome<u32> = Outcome::CancelDownstream;
        assert_eq!(cancelled.label(), "cancelled");
        assert!(cancelled.map(|n| n + 1).success().is_none());
    }
}
