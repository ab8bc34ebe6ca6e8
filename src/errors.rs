use pgq_worker_job::MethodRefError;
use pgq_worker_migrations::MigrateError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during pgq_worker operations.
///
/// Job failures are not part of this enum: they are contained per job and
/// reported as [`JobError`](pgq_worker_job::JobError) to the failure hook.
#[derive(Error, Debug)]
pub enum PgqWorkerError {
    /// An error occurred while executing an SQL statement
    #[error("Error occured while query: {0}")]
    SqlError(#[from] sqlx::Error),

    /// An error occurred while serializing or deserializing JSON data
    #[error("Error while serializing params: {0}")]
    JsonSerializeError(#[from] serde_json::Error),

    /// Neither a database url nor a database config file could be resolved
    #[error("Missing database configuration - set PGQ_DATABASE_URL, DATABASE_URL or PGQ_DATABASE_CONFIG")]
    MissingConnectionConfig,

    /// The connection settings were present but unusable
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A job was enqueued with a malformed method
    #[error("Invalid job method: {0}")]
    InvalidMethod(#[from] MethodRefError),

    /// Applying the schema migrations failed
    #[error("Error occurred while migrating the database schema: {0}")]
    Migrate(#[from] MigrateError),
}

/// A Result type alias for PgqWorkerError.
pub type Result<T> = core::result::Result<T, PgqWorkerError>;
