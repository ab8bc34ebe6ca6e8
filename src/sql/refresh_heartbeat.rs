use indoc::formatdoc;

use crate::conn::{ConnectionManager, PgConnector, SqlParam};
use crate::errors::Result;

/// Stamps `heartbeat_at` on a job locked by `worker_id`.
///
/// The first beat records `heartbeat_by`; later beats only match while it is
/// unchanged. Returns `false` when the job is gone, unlocked, locked by
/// another worker, or heartbeated by someone else.
#[tracing::instrument(skip(conn, escaped_schema), err, fields(otel.kind="client", db.system="postgresql"))]
pub async fn refresh_heartbeat(
    conn: &ConnectionManager<PgConnector>,
    escaped_schema: &str,
    worker_id: &str,
    heartbeat_id: &str,
    job_id: i64,
) -> Result<bool> {
    let sql = formatdoc!(
        r#"
            update {escaped_schema}.jobs
                set heartbeat_at = now(), heartbeat_by = $1::text
                where id = $2::bigint
                    and locked_at is not null
                    and locked_by = $3::text
                    and (heartbeat_by is null or heartbeat_by = $1::text)
                returning id;
        "#
    );

    let output = conn
        .execute(
            &sql,
            &[
                SqlParam::from(heartbeat_id),
                SqlParam::Int(job_id),
                SqlParam::from(worker_id),
            ],
        )
        .await?;

    Ok(!output.is_none())
}
