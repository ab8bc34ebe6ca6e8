use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use getset::Getters;
use pgq_worker_ctx::JobContext;
use pgq_worker_hooks::{
    ClaimLost, JobCompleted, JobDeleted, JobFailed, JobFailure, JobLocked, LifeCycleEvent,
    WorkerHooks,
};
use pgq_worker_job::Job;
use pgq_worker_job_handler::{spawn_job, RunJobError};
use pgq_worker_shutdown_signal::{on_shutdown, shutdown_signal};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::builder::WorkerOptions;
use crate::conn::{ConnectionManager, Connector, PgConnector};
use crate::errors::PgqWorkerError;
use crate::heartbeat::{Heartbeat, DEFAULT_HEARTBEAT_INTERVAL};
use crate::isolation::{is_isolated_child, ChildCommand, IsolationMode};
use crate::pg_queue::PgQueue;
use crate::queue::Queue;
use crate::queue_utils::QueueUtils;
use crate::registry::JobRegistry;
use crate::utils::generate_worker_id;

/// Errors that end a worker's run loop.
#[derive(Error, Debug)]
pub enum WorkerRuntimeError {
    /// Locking, waiting or deleting failed at the database level
    #[error("Database error while running worker: '{0}'")]
    Pg(#[from] PgqWorkerError),
    /// The heartbeat found the running job's claim gone; the job was left in
    /// place and the worker stopped
    #[error("Lost the claim on job {job_id} (heartbeat {heartbeat_id}), worker stopped")]
    LivenessLost { job_id: i64, heartbeat_id: String },
    /// An isolated child process could not be started or awaited
    #[error("Could not run isolated child process: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Flips a worker to stopped from anywhere, e.g. a signal handler.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Claims jobs from its queues one at a time and runs them.
///
/// Queues are polled in a fixed order, the primary queue first, so a busy
/// primary queue can starve the others. When every queue comes up empty the
/// worker waits on the queues' notification channels before polling again.
#[derive(Getters)]
#[getset(get = "pub")]
pub struct Worker<C: Connector = PgConnector, Q: Queue = PgQueue> {
    /// Identity written into `locked_by`
    worker_id: String,
    #[getset(skip)]
    queues: Vec<Arc<Q>>,
    /// Names of the bound queues, in polling order
    queue_names: Vec<String>,
    #[getset(skip)]
    conn: Arc<ConnectionManager<C>>,
    #[getset(skip)]
    registry: Arc<JobRegistry>,
    #[getset(skip)]
    hooks: Arc<dyn WorkerHooks>,
    #[getset(skip)]
    running: Arc<AtomicBool>,
    isolation: IsolationMode,
    heartbeat_interval: Duration,
    #[getset(skip)]
    child_command: Option<ChildCommand>,
    listen_os_shutdown_signals: bool,
}

impl Worker {
    /// Creates a new `WorkerOptions` builder with default settings.
    pub fn options() -> WorkerOptions {
        WorkerOptions::default()
    }

    /// Admin utilities on the same database and schema as this worker.
    pub fn create_utils(&self) -> Result<QueueUtils, PgqWorkerError> {
        let options = self
            .conn
            .connector()
            .connect_options()
            .cloned()
            .ok_or(PgqWorkerError::MissingConnectionConfig)?;
        let pg_pool = PgPoolOptions::new()
            .max_connections(2)
            .connect_lazy_with(options);
        let escaped_schema = self.queues[0].escaped_schema().clone();

        Ok(QueueUtils::new(pg_pool, escaped_schema))
    }
}

impl<C: Connector, Q: Queue> Worker<C, Q> {
    /// Assembles a worker from its parts. The first queue is the primary one.
    ///
    /// # Panics
    ///
    /// Panics if `queues` is empty.
    pub fn from_parts(conn: Arc<ConnectionManager<C>>, queues: Vec<Q>, registry: JobRegistry) -> Self {
        assert!(!queues.is_empty(), "A worker needs at least one queue");

        let queues: Vec<Arc<Q>> = queues.into_iter().map(Arc::new).collect();
        let queue_names = queues.iter().map(|queue| queue.name().to_string()).collect();

        Worker {
            worker_id: generate_worker_id(),
            queues,
            queue_names,
            conn,
            registry: Arc::new(registry),
            hooks: Arc::new(()),
            running: Arc::new(AtomicBool::new(true)),
            isolation: IsolationMode::default(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            child_command: None,
            listen_os_shutdown_signals: false,
        }
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn WorkerHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_isolation(mut self, isolation: IsolationMode) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Command spawned per cycle in [`IsolationMode::Subprocess`]. Defaults
    /// to re-running the current executable.
    pub fn with_child_command(mut self, command: ChildCommand) -> Self {
        self.child_command = Some(command);
        self
    }

    pub fn with_os_shutdown_signals(mut self, listen: bool) -> Self {
        self.listen_os_shutdown_signals = listen;
        self
    }

    pub fn connection(&self) -> &Arc<ConnectionManager<C>> {
        &self.conn
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops the worker once the job in flight, if any, has finished.
    pub fn stop(&self) {
        info!(at = "stop", worker_id = %self.worker_id);
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.running.clone())
    }

    /// Works jobs until stopped.
    ///
    /// Inside an isolated child this performs exactly one work cycle and
    /// returns.
    pub async fn run(&self) -> Result<(), WorkerRuntimeError> {
        let shutdown_listener = self.listen_os_shutdown_signals.then(|| {
            let stop_handle = self.stop_handle();
            on_shutdown(shutdown_signal(), move || stop_handle.stop())
        });

        let result = if is_isolated_child() {
            self.hooks.setup_child().await;
            self.work().await
        } else {
            info!(
                worker_id = %self.worker_id,
                queues = ?self.queue_names,
                isolation = %self.isolation,
                "Worker started"
            );
            self.run_loop().await
        };

        if let Some(listener) = shutdown_listener {
            listener.abort();
        }
        self.conn.disconnect().await;
        info!(worker_id = %self.worker_id, "Worker stopped");

        result
    }

    async fn run_loop(&self) -> Result<(), WorkerRuntimeError> {
        while self.is_running() {
            match self.isolation {
                IsolationMode::InProcess => self.work().await?,
                IsolationMode::Subprocess => {
                    self.fork_and_work().await?;
                }
            }
        }
        Ok(())
    }

    /// Claims one job and processes it.
    pub async fn work(&self) -> Result<(), WorkerRuntimeError> {
        let start = Instant::now();
        let Some((queue, job)) = self.lock_job().await? else {
            return Ok(());
        };

        let job_id = *job.id();
        let span = info_span!(
            "work",
            job_id,
            q_name = %job.q_name(),
            method = %job.method(),
            worker_id = %self.worker_id
        );
        let result = self.process(queue, job).instrument(span).await;

        info!(
            at = "work",
            job_id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Work cycle finished"
        );
        result
    }

    /// Polls the bound queues until one of them yields a job.
    ///
    /// Returns `None` only once the worker has been stopped.
    pub async fn lock_job(&self) -> Result<Option<(Arc<Q>, Job)>, WorkerRuntimeError> {
        debug!(at = "lock_job", worker_id = %self.worker_id);
        let mut attempts: u64 = 0;

        while self.is_running() {
            attempts += 1;
            for queue in &self.queues {
                if let Some(job) = queue.lock().await? {
                    debug!(
                        at = "lock_job",
                        attempts,
                        job_id = job.id(),
                        q_name = queue.name(),
                        "Locked job"
                    );
                    return Ok(Some((queue.clone(), job)));
                }
            }
            self.conn.wait(&self.queue_names).await?;
        }

        Ok(None)
    }

    /// Runs a claimed job under a heartbeat, reports the outcome and deletes
    /// the job.
    ///
    /// Failures of the job itself never escape: they go to the failure hook
    /// and the job is deleted all the same. The one exception is a lost
    /// claim, which leaves the job alone and stops the worker.
    pub async fn process(&self, queue: Arc<Q>, job: Job) -> Result<(), WorkerRuntimeError> {
        let job = Arc::new(job);
        let job_id = *job.id();
        let heartbeat = Heartbeat::start(queue.clone(), job_id, self.heartbeat_interval);
        let heartbeat_id = heartbeat.heartbeat_id().to_string();

        self.hooks
            .on_event(LifeCycleEvent::Locked(JobLocked {
                job_id,
                q_name: job.q_name().clone(),
                method: job.method().clone(),
            }))
            .await;

        let ctx = JobContext::new(job.clone(), self.worker_id.clone(), heartbeat_id.clone());
        let outcome = spawn_job(self.registry.dispatch(ctx), heartbeat.lost()).await;
        let claim_lost = heartbeat.is_lost();
        heartbeat.stop().await;

        match outcome.result {
            Err(RunJobError::Aborted) => return self.on_claim_lost(&job, heartbeat_id).await,
            _ if claim_lost => return self.on_claim_lost(&job, heartbeat_id).await,
            Ok(()) => {
                info!(
                    job_id,
                    method = %job.method(),
                    duration = outcome.duration.as_millis() as u64,
                    "Completed job with success"
                );
                self.hooks
                    .on_event(LifeCycleEvent::Completed(JobCompleted {
                        job_id,
                        q_name: job.q_name().clone(),
                        method: job.method().clone(),
                        duration: outcome.duration,
                    }))
                    .await;
            }
            Err(RunJobError::Job(error)) => {
                self.hooks
                    .on_event(LifeCycleEvent::Failed(JobFailed {
                        job_id,
                        q_name: job.q_name().clone(),
                        method: job.method().clone(),
                        error: error.clone(),
                        duration: outcome.duration,
                    }))
                    .await;
                self.hooks
                    .on_failure(JobFailure {
                        job: job.clone(),
                        error,
                        worker_id: self.worker_id.clone(),
                    })
                    .await;
            }
        }

        queue.delete(job_id).await?;
        info!(at = "delete_job", job_id, q_name = %job.q_name());
        self.hooks
            .on_event(LifeCycleEvent::Deleted(JobDeleted {
                job_id,
                q_name: job.q_name().clone(),
            }))
            .await;

        Ok(())
    }

    async fn on_claim_lost(&self, job: &Job, heartbeat_id: String) -> Result<(), WorkerRuntimeError> {
        let job_id = *job.id();
        error!(
            at = "liveness_lost",
            job_id,
            heartbeat_id,
            worker_id = %self.worker_id,
            "Lost the claim on the running job, shutting down"
        );

        self.hooks
            .on_event(LifeCycleEvent::LivenessLost(ClaimLost {
                job_id,
                q_name: job.q_name().clone(),
                worker_id: self.worker_id.clone(),
                heartbeat_id: heartbeat_id.clone(),
            }))
            .await;

        self.stop();
        self.conn.disconnect().await;

        Err(WorkerRuntimeError::LivenessLost {
            job_id,
            heartbeat_id,
        })
    }

    /// Runs one work cycle in a child process and waits for it to exit.
    pub async fn fork_and_work(&self) -> Result<ExitStatus, WorkerRuntimeError> {
        let command = match &self.child_command {
            Some(command) => command.clone(),
            None => ChildCommand::current_exe().map_err(WorkerRuntimeError::Spawn)?,
        };

        let mut child = command.spawn().map_err(WorkerRuntimeError::Spawn)?;
        info!(
            at = "fork",
            pid = child.id(),
            program = %command.program().display(),
            "Spawned isolated child"
        );

        let status = child.wait().await.map_err(WorkerRuntimeError::Spawn)?;
        if status.success() {
            info!(at = "fork", status = %status, "Isolated child exited");
        } else {
            warn!(at = "fork", status = %status, "Isolated child exited with failure");
        }

        Ok(status)
    }
}
