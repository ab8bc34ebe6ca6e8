use indoc::formatdoc;

use crate::conn::{ConnectionManager, PgConnector, SqlParam};
use crate::errors::Result;

#[tracing::instrument(skip(conn, escaped_schema), err, fields(otel.kind="client", db.system="postgresql"))]
pub async fn delete_job(
    conn: &ConnectionManager<PgConnector>,
    escaped_schema: &str,
    job_id: i64,
) -> Result<()> {
    let sql = formatdoc!(
        r#"
            delete from {escaped_schema}.jobs
            where id = $1::bigint;
        "#
    );

    conn.execute(&sql, &[SqlParam::Int(job_id)]).await?;

    Ok(())
}
