use std::future::Future;
use std::pin::Pin;

use pgq_worker::isolation::is_isolated_child;
use pgq_worker::{IntoJobResult, JobContext, JobFailure, JobHandler, WorkerHooks, WorkerOptions};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::{
    filter::EnvFilter, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

fn enable_logs() {
    let fmt_layer = tracing_subscriber::fmt::layer();
    // Log level set to debug except for sqlx set at warn (to not show all sql requests)
    let filter_layer = EnvFilter::try_new("debug,sqlx=warn").unwrap();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}

#[derive(Deserialize, Serialize)]
struct ReporterRun {
    report_id: i64,
}

impl JobHandler for ReporterRun {
    const METHOD: &'static str = "Reporter.run";

    async fn run(self, ctx: JobContext) -> impl IntoJobResult {
        if self.report_id < 0 {
            return Err(format!("no such report: {}", self.report_id));
        }
        info!(job_id = ctx.job_id(), report_id = self.report_id, "Building report");
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        Ok(())
    }
}

/// Logs failures loudly instead of dropping them.
struct LogFailures;

impl WorkerHooks for LogFailures {
    fn on_failure(&self, failure: JobFailure) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            warn!(
                job_id = failure.job.id(),
                method = %failure.job.method(),
                error = %failure.error,
                "Report job failed and was removed from the queue"
            );
        })
    }
}

// Run with PGQ_DATABASE_URL or DATABASE_URL set. PGQ_ISOLATION=subprocess
// runs every job in a child copy of this binary.
#[tokio::main]
async fn main() {
    enable_logs();

    let worker = WorkerOptions::from_env()
        .expect("Invalid PGQ_* environment")
        .define_job::<ReporterRun>()
        .hooks(LogFailures)
        .init()
        .await
        .expect("Failed to create worker");

    if !is_isolated_child() {
        let utils = worker.create_utils().expect("Failed to create utils");
        for report_id in [42, 7, -1] {
            utils
                .enqueue_job("default", &ReporterRun { report_id })
                .await
                .expect("Failed to enqueue report");
        }
    }

    worker.run().await.expect("Worker stopped with an error");
}
