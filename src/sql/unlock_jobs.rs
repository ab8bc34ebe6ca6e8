use std::time::Duration;

use indoc::formatdoc;
use sqlx::{query, PgExecutor};
use tracing::info;

use crate::errors::Result;

/// Releases claims whose last sign of life is older than `older_than`.
///
/// A job's last sign of life is its latest heartbeat, or the moment it was
/// locked if it never beat. Released jobs can be locked again.
pub async fn unlock_stale_jobs(
    executor: impl for<'e> PgExecutor<'e>,
    escaped_schema: &str,
    older_than: Duration,
) -> Result<u64> {
    let sql = formatdoc!(
        r#"
            update {escaped_schema}.jobs
                set locked_at = null, locked_by = null, heartbeat_at = null, heartbeat_by = null
                where locked_at is not null
                    and coalesce(heartbeat_at, locked_at) < now() - make_interval(secs => $1::double precision);
        "#
    );

    let result = query(&sql)
        .bind(older_than.as_secs_f64())
        .execute(executor)
        .await?;

    let unlocked = result.rows_affected();
    if unlocked > 0 {
        info!(unlocked, older_than = ?older_than, "Unlocked stale jobs");
    }

    Ok(unlocked)
}
