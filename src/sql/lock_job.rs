use indoc::formatdoc;
use pgq_worker_job::Job;
use sqlx::FromRow;

use crate::conn::{ConnectionManager, PgConnector, SqlParam};
use crate::errors::Result;
use crate::sql::JOB_COLUMNS;

/// Claims one of the `top_bound` oldest unlocked jobs of a queue.
///
/// Rows already locked by a concurrent claim are skipped rather than waited
/// on, and `locked_at is null` is checked again once the row lock is held,
/// so two workers never walk away with the same job.
#[tracing::instrument(skip(conn, escaped_schema), err, fields(otel.kind="client", db.system="postgresql"))]
pub async fn lock_job(
    conn: &ConnectionManager<PgConnector>,
    escaped_schema: &str,
    q_name: &str,
    top_bound: i64,
    worker_id: &str,
) -> Result<Option<Job>> {
    let sql = formatdoc!(
        r#"
            update {escaped_schema}.jobs
                set locked_at = now(), locked_by = $3::text
                where id = (
                    select id from {escaped_schema}.jobs
                    where id in (
                        select id from {escaped_schema}.jobs
                        where q_name = $1::text and locked_at is null
                        order by id asc
                        limit $2::bigint
                    )
                    and locked_at is null
                    order by id asc
                    limit 1
                    for update skip locked
                )
                returning {JOB_COLUMNS};
        "#
    );

    let row = conn
        .execute(
            &sql,
            &[
                SqlParam::from(q_name),
                SqlParam::Int(top_bound),
                SqlParam::from(worker_id),
            ],
        )
        .await?
        .into_first();

    Ok(row.as_ref().map(Job::from_row).transpose()?)
}
