use std::time::Duration;

use pgq_worker_job::{Job, MethodRef};
use pgq_worker_job_handler::JobHandler;
use pgq_worker_migrations::migrate;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::errors::Result;
use crate::sql::add_job::add_job;
use crate::sql::count_jobs::{count_jobs, delete_all_jobs};
use crate::sql::unlock_jobs::unlock_stale_jobs;
use crate::utils::escape_identifier;

/// Producer and maintenance operations on a pgq_worker schema.
///
/// Unlike a worker, these go through an ordinary connection pool: producers
/// typically live in other processes and never listen for notifications.
#[derive(Clone)]
pub struct QueueUtils {
    /// Database connection pool
    pg_pool: PgPool,

    /// SQL-escaped schema name where the jobs table lives
    escaped_schema: String,
}

impl QueueUtils {
    pub fn new(pg_pool: PgPool, escaped_schema: String) -> Self {
        Self {
            pg_pool,
            escaped_schema,
        }
    }

    /// Escapes `schema` on the server and builds the utils for it.
    pub async fn for_schema(pg_pool: PgPool, schema: &str) -> Result<Self> {
        let escaped_schema = escape_identifier(&pg_pool, schema).await?;
        Ok(Self::new(pg_pool, escaped_schema))
    }

    pub fn escaped_schema(&self) -> &str {
        &self.escaped_schema
    }

    /// Installs or upgrades the schema.
    pub async fn migrate(&self) -> Result<()> {
        migrate(&self.pg_pool, &self.escaped_schema).await?;
        Ok(())
    }

    /// Adds a job to `q_name`.
    ///
    /// `args` is the positional argument list; anything that is not a JSON
    /// array is stored as a single argument.
    ///
    /// ```no_run
    /// # use pgq_worker::QueueUtils;
    /// # async fn example(utils: QueueUtils) -> Result<(), Box<dyn std::error::Error>> {
    /// let job = utils
    ///     .enqueue("default", "Reporter.run", serde_json::json!([42]))
    ///     .await?;
    /// println!("enqueued job {}", job.id());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn enqueue(&self, q_name: &str, method: &str, args: Value) -> Result<Job> {
        method.parse::<MethodRef>()?;

        add_job(
            &self.pg_pool,
            &self.escaped_schema,
            q_name,
            method,
            into_arg_list(args),
        )
        .await
    }

    /// Adds a job running `handler` under [`JobHandler::METHOD`].
    ///
    /// A struct with named fields is stored as a single object argument and
    /// decoded back by field name; tuple structs are stored positionally.
    pub async fn enqueue_job<T: JobHandler + Serialize>(
        &self,
        q_name: &str,
        handler: &T,
    ) -> Result<Job> {
        let args = serde_json::to_value(handler)?;
        self.enqueue(q_name, T::METHOD, args).await
    }

    /// Number of jobs waiting or running, in `q_name` or in every queue.
    pub async fn count(&self, q_name: Option<&str>) -> Result<i64> {
        count_jobs(&self.pg_pool, &self.escaped_schema, q_name).await
    }

    /// Deletes every job in `q_name`, or in every queue.
    pub async fn delete_all(&self, q_name: Option<&str>) -> Result<u64> {
        delete_all_jobs(&self.pg_pool, &self.escaped_schema, q_name).await
    }

    /// Makes jobs whose worker stopped beating for `older_than` lockable
    /// again. Returns how many were released.
    pub async fn unlock_stale_jobs(&self, older_than: Duration) -> Result<u64> {
        unlock_stale_jobs(&self.pg_pool, &self.escaped_schema, older_than).await
    }
}

fn into_arg_list(args: Value) -> Value {
    match args {
        Value::Array(_) => args,
        Value::Null => Value::Array(Vec::new()),
        other => Value::Array(vec![other]),
    }
}
