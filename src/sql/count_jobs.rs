use indoc::formatdoc;
use sqlx::{query, query_scalar, PgExecutor};

use crate::errors::Result;

/// Number of jobs, in one queue or in all of them.
pub async fn count_jobs(
    executor: impl for<'e> PgExecutor<'e>,
    escaped_schema: &str,
    q_name: Option<&str>,
) -> Result<i64> {
    let sql = formatdoc!(
        r#"
            select count(*) from {escaped_schema}.jobs
            where $1::text is null or q_name = $1::text;
        "#
    );

    let count: i64 = query_scalar(&sql).bind(q_name).fetch_one(executor).await?;

    Ok(count)
}

/// Deletes every job, in one queue or in all of them.
pub async fn delete_all_jobs(
    executor: impl for<'e> PgExecutor<'e>,
    escaped_schema: &str,
    q_name: Option<&str>,
) -> Result<u64> {
    let sql = formatdoc!(
        r#"
            delete from {escaped_schema}.jobs
            where $1::text is null or q_name = $1::text;
        "#
    );

    let result = query(&sql).bind(q_name).execute(executor).await?;

    Ok(result.rows_affected())
}
