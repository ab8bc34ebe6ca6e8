use std::future::Future;

use pgq_worker_job::Job;

use crate::errors::Result;

/// A named partition of jobs a worker can claim from.
///
/// Implementations must make [`lock`](Queue::lock) atomic across processes:
/// two callers never receive the same job.
pub trait Queue: Send + Sync + 'static {
    /// Name of the queue, also the notification channel producers signal on
    fn name(&self) -> &str;

    /// Claims at most one job.
    fn lock(&self) -> impl Future<Output = Result<Option<Job>>> + Send;

    /// Removes a job. Deleting a job that is already gone is not an error.
    fn delete(&self, job_id: i64) -> impl Future<Output = Result<()>> + Send;

    /// Refreshes the liveness record of a running job.
    ///
    /// Resolves to `false` once the job, or this worker's claim on it, is
    /// gone.
    fn heartbeat(
        &self,
        heartbeat_id: &str,
        job_id: i64,
    ) -> impl Future<Output = Result<bool>> + Send;
}
