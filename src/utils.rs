use rand::RngCore;
use sqlx::{query_scalar, Executor, Postgres};

use crate::errors::Result;

/// Escapes an identifier server side, the same way `format('%I')` does.
pub async fn escape_identifier<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    identifier: &str,
) -> Result<String> {
    let escaped_identifier: String = query_scalar("select format('%I', $1::text)")
        .bind(identifier)
        .fetch_one(executor)
        .await?;

    Ok(escaped_identifier)
}

/// Quotes an identifier for statements that cannot take bind parameters
/// (`LISTEN`, `UNLISTEN`).
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Random identity a worker writes into `locked_by`.
pub fn generate_worker_id() -> String {
    let mut random_bytes = [0u8; 9];
    rand::rng().fill_bytes(&mut random_bytes);
    format!("pgq_worker_{}", hex::encode(random_bytes))
}
