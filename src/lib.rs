#![doc = r#"
A PostgreSQL backed job queue.

Producers insert rows into a `jobs` table; workers claim them one at a time,
run the registered handler and delete the row, whatever the outcome. Each
worker process talks to the database through a single managed connection,
sleeps on `LISTEN`/`NOTIFY` when its queues are empty, keeps a heartbeat on
the job it is running and can run every job in a throw-away child process.

```no_run
use pgq_worker::{IntoJobResult, JobContext, JobHandler, WorkerOptions};
use serde::Deserialize;

#[derive(Deserialize)]
struct ReporterRun {
    report_id: i64,
}

impl JobHandler for ReporterRun {
    const METHOD: &'static str = "Reporter.run";

    async fn run(self, _ctx: JobContext) -> impl IntoJobResult {
        println!("running report {}", self.report_id);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let worker = WorkerOptions::from_env()?
        .define_job::<ReporterRun>()
        .init()
        .await?;

    worker.create_utils()?
        .enqueue("default", "Reporter.run", serde_json::json!([42]))
        .await?;

    worker.run().await?;
    Ok(())
}
```
"#]

pub mod builder;
pub mod config;
pub mod conn;
pub mod errors;
pub mod heartbeat;
pub mod isolation;
pub mod pg_queue;
pub mod queue;
pub mod queue_utils;
pub mod registry;
pub mod runner;
pub mod sql;
mod utils;

pub use crate::builder::{WorkerBuildError, WorkerOptions, DEFAULT_QUEUE, DEFAULT_SCHEMA};
pub use crate::config::{ConfigError, ConnectionSource, DatabaseConfig};
pub use crate::conn::{
    ConnectionManager, Connector, Notification, PgConnector, PgSession, QueryOutput, Session,
    SqlParam,
};
pub use crate::errors::{PgqWorkerError, Result};
pub use crate::heartbeat::Heartbeat;
pub use crate::isolation::{ChildCommand, IsolationMode, ISOLATED_CHILD_ENV};
pub use crate::pg_queue::PgQueue;
pub use crate::queue::Queue;
pub use crate::queue_utils::QueueUtils;
pub use crate::registry::JobRegistry;
pub use crate::runner::{StopHandle, Worker, WorkerRuntimeError};
pub use crate::utils::quote_identifier;

pub use pgq_worker_ctx::JobContext;
pub use pgq_worker_hooks::{
    ClaimLost, JobCompleted, JobDeleted, JobFailed, JobFailure, JobLocked, LifeCycleEvent,
    WorkerHooks,
};
pub use pgq_worker_job::{Job, JobBuilder, JobError, MethodRef, MethodRefError};
pub use pgq_worker_job_handler::{IntoJobResult, JobHandler};
pub use pgq_worker_migrations::MigrateError;
pub use pgq_worker_shutdown_signal::{shutdown_signal, ShutdownSignal};
