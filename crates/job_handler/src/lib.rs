mod handler;
mod job_result;
mod spawn;

pub use handler::{run_handler, HandlerFn, JobHandler};
pub use job_result::IntoJobResult;
pub use spawn::{spawn_job, RunJobError, SpawnJobResult};
