use std::any::Any;
use std::future::Future;
use std::time::{Duration, Instant};

use pgq_worker_job::JobError;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunJobError {
    /// The job body ran to completion with an error, or panicked
    Job(JobError),
    /// The cancel token fired before the job body finished
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnJobResult {
    pub duration: Duration,
    pub result: Result<(), RunJobError>,
}

impl SpawnJobResult {
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn result(&self) -> &Result<(), RunJobError> {
        &self.result
    }
}

impl RunJobError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, RunJobError::Aborted)
    }
}

/// Runs a job body on its own tokio task.
///
/// A panic in the body is caught and reported as [`JobError::Panicked`].
/// When `cancel_token` fires first the task is aborted and the result is
/// [`RunJobError::Aborted`].
pub async fn spawn_job<F>(job_fut: F, cancel_token: CancellationToken) -> SpawnJobResult
where
    F: Future<Output = Result<(), JobError>> + Send + 'static,
{
    let start = Instant::now();
    let task = tokio::spawn(job_fut);
    let abort_handle = task.abort_handle();

    let result = tokio::select! {
        _ = cancel_token.cancelled() => {
            abort_handle.abort();
            Err(RunJobError::Aborted)
        }
        res = task => match res {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(RunJobError::Job(e)),
            Err(e) if e.is_panic() => Err(RunJobError::Job(JobError::Panicked(
                panic_message(e.into_panic()),
            ))),
            Err(e) => Err(RunJobError::Job(JobError::Panicked(e.to_string()))),
        },
    };

    SpawnJobResult {
        duration: start.elapsed(),
        result,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(msg) => *msg,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(msg) => msg.to_string(),
            Err(_) => "non-string panic payload".to_string(),
        },
    }
}
