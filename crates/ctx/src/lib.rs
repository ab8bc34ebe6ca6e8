use getset::Getters;
use pgq_worker_job::Job;
use serde_json::Value;
use std::sync::Arc;

/// Everything a handler gets to know about the job it is running.
#[derive(Getters, Clone, Debug)]
#[getset(get = "pub")]
pub struct JobContext {
    job: Arc<Job>,
    /// Identity of the worker that claimed the job
    worker_id: String,
    /// Per-job identifier the heartbeat refreshes the claim with
    heartbeat_id: String,
}

impl JobContext {
    pub fn new(job: Arc<Job>, worker_id: String, heartbeat_id: String) -> Self {
        JobContext {
            job,
            worker_id,
            heartbeat_id,
        }
    }

    pub fn job_id(&self) -> i64 {
        *self.job.id()
    }

    pub fn args(&self) -> &Value {
        self.job.args()
    }
}
