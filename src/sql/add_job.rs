use indoc::formatdoc;
use pgq_worker_job::Job;
use serde_json::Value;
use sqlx::{query_as, PgExecutor};
use tracing::info;

use crate::errors::Result;
use crate::sql::JOB_COLUMNS;

/// Inserts a job. The insert trigger notifies the queue's channel.
pub async fn add_job(
    executor: impl for<'e> PgExecutor<'e>,
    escaped_schema: &str,
    q_name: &str,
    method: &str,
    args: Value,
) -> Result<Job> {
    let sql = formatdoc!(
        r#"
            insert into {escaped_schema}.jobs (q_name, method, args)
                values ($1::text, $2::text, $3::jsonb)
                returning {JOB_COLUMNS};
        "#
    );

    let job: Job = query_as(&sql)
        .bind(q_name)
        .bind(method)
        .bind(&args)
        .fetch_one(executor)
        .await?;

    info!(
        job_id = job.id(),
        q_name,
        method,
        args = %args,
        "Job added to queue"
    );

    Ok(job)
}
