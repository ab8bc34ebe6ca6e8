use indoc::formatdoc;
use sqlx::{query, PgExecutor, Row};

use crate::MigrateError;

/// Lowest supported `server_version_num`
const MIN_SERVER_VERSION: u32 = 120000;

/// Fetches the server version and checks that pgq_worker supports it
pub async fn fetch_and_check_postgres_version<'e, E>(executor: E) -> Result<u32, MigrateError>
where
    E: PgExecutor<'e>,
{
    let sql = formatdoc!(
        r#"
            select current_setting('server_version_num') as server_version_num
        "#
    );

    let row = query(&sql).fetch_one(executor).await?;
    let version_string: String = row.try_get("server_version_num")?;

    check_postgres_version(&version_string)
}

/// Checks a `server_version_num` string against the supported minimum
pub fn check_postgres_version(version_string: &str) -> Result<u32, MigrateError> {
    let version = version_string.parse::<u32>()?;

    if version < MIN_SERVER_VERSION {
        return Err(MigrateError::IncompatibleVersion(version));
    }

    Ok(version)
}
