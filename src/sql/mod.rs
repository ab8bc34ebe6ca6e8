pub mod add_job;
pub mod count_jobs;
pub mod delete_job;
pub mod lock_job;
pub mod refresh_heartbeat;
pub mod unlock_jobs;

/// Columns a [`Job`](pgq_worker_job::Job) is decoded from.
pub(crate) const JOB_COLUMNS: &str = "id, q_name, method, args, locked_at, locked_by, created_at";
