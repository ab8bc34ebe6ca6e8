use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use pgq_worker_job::{Job, JobError};
use tracing::{error, info};

/// A variant of this enum is emitted at each lifecycle point.
#[derive(Debug, Clone)]
pub enum LifeCycleEvent {
    /// Variant emitted when a job has been claimed from a queue.
    Locked(JobLocked),
    /// Variant emitted when a job body returned successfully.
    Completed(JobCompleted),
    /// Variant emitted when a job body failed, before the failure hook runs.
    Failed(JobFailed),
    /// Variant emitted once the job row has been removed from the queue.
    Deleted(JobDeleted),
    /// Variant emitted when the heartbeat lost the claim on a running job.
    LivenessLost(ClaimLost),
}

/// Event emitted when a job is claimed.
#[derive(Debug, Clone)]
pub struct JobLocked {
    /// Unique identifier for the job
    pub job_id: i64,
    /// Queue the job was claimed from
    pub q_name: String,
    /// Action reference (e.g. "Reporter.run")
    pub method: String,
}

/// Event emitted when a job body returns successfully.
#[derive(Debug, Clone)]
pub struct JobCompleted {
    pub job_id: i64,
    pub q_name: String,
    pub method: String,
    /// Duration of job execution
    pub duration: Duration,
}

/// Event emitted when a job body fails.
#[derive(Debug, Clone)]
pub struct JobFailed {
    pub job_id: i64,
    pub q_name: String,
    pub method: String,
    /// Error raised by the job
    pub error: JobError,
    /// Duration of job execution before failure
    pub duration: Duration,
}

/// Event emitted after the job row has been deleted.
#[derive(Debug, Clone)]
pub struct JobDeleted {
    pub job_id: i64,
    pub q_name: String,
}

/// Event emitted when the worker stops because it no longer holds its claim.
#[derive(Debug, Clone)]
pub struct ClaimLost {
    pub job_id: i64,
    pub q_name: String,
    pub worker_id: String,
    pub heartbeat_id: String,
}

/// A failed job, as handed to [`WorkerHooks::on_failure`].
#[derive(Debug, Clone)]
pub struct JobFailure {
    pub job: Arc<Job>,
    pub error: JobError,
    /// Identity of the worker that ran the job
    pub worker_id: String,
}

/// Integration points of a worker.
///
/// Every method has a default, so an implementation only overrides what it
/// needs:
///
/// * [`on_failure`](WorkerHooks::on_failure) is called when a job body errors,
///   panics or cannot be dispatched. The job is deleted afterwards regardless,
///   so this is the place to re-enqueue, dead-letter or alert. The default
///   only logs.
/// * [`setup_child`](WorkerHooks::setup_child) runs once inside every
///   isolated child process before it claims a job, to re-create
///   process-local resources.
/// * [`on_event`](WorkerHooks::on_event) observes the job lifecycle.
///
/// # Example
///
/// ```rust
/// use pgq_worker_hooks::{JobFailure, WorkerHooks};
/// use std::future::Future;
/// use std::pin::Pin;
///
/// struct DeadLetter;
///
/// impl WorkerHooks for DeadLetter {
///     fn on_failure(&self, failure: JobFailure) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
///         Box::pin(async move {
///             eprintln!("job {} failed: {}", failure.job.id(), failure.error);
///         })
///     }
/// }
/// ```
pub trait WorkerHooks: Send + Sync {
    /// Called with the job and the error it raised.
    fn on_failure(&self, failure: JobFailure) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            error!(
                at = "handle_failure",
                job_id = failure.job.id(),
                q_name = %failure.job.q_name(),
                method = %failure.job.method(),
                args = %failure.job.args(),
                worker_id = %failure.worker_id,
                error = %failure.error,
                "Job failed"
            );
        })
    }

    /// Called inside each isolated child before its work cycle.
    fn setup_child(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async {
            info!(at = "setup_child", pid = std::process::id());
        })
    }

    /// Called on any job lifecycle event.
    fn on_event(&self, _event: LifeCycleEvent) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async {})
    }
}

/// Unit type keeps every default: failures are logged, nothing else happens.
impl WorkerHooks for () {}

impl<T: WorkerHooks + ?Sized> WorkerHooks for Arc<T> {
    fn on_failure(&self, failure: JobFailure) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        (**self).on_failure(failure)
    }

    fn setup_child(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        (**self).setup_child()
    }

    fn on_event(&self, event: LifeCycleEvent) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        (**self).on_event(event)
    }
}
