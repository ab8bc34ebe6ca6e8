mod error;
mod method;

pub use error::JobError;
pub use method::{MethodRef, MethodRefError};

use chrono::{DateTime, Utc};
use derive_builder::Builder;
use getset::Getters;
use serde_json::Value;
use sqlx::FromRow;

/// A job as claimed from the queue table.
///
/// The worker only ever holds a transient view of a job: it is the queue that
/// owns the row, and the worker is responsible for deleting it once the
/// handler has returned (successfully or not).
#[derive(FromRow, Getters, Debug, Clone, PartialEq, Eq, Builder)]
#[getset(get = "pub")]
#[builder(build_fn(private, name = "build_internal"), pattern = "owned")]
pub struct Job {
    /// Unique identifier, assigned by the database
    #[builder(default)]
    id: i64,
    /// Name of the queue (and notification channel) this job belongs to
    #[builder(default = "String::from(\"default\")", setter(into))]
    q_name: String,
    /// Action reference, `Receiver.message`
    #[builder(setter(into))]
    method: String,
    /// Ordered argument list, stored as a JSON array
    #[builder(default = "serde_json::json!([])")]
    args: Value,
    /// When the job was claimed by a worker
    #[builder(default, setter(strip_option))]
    locked_at: Option<DateTime<Utc>>,
    /// Identity of the worker holding the claim
    #[builder(default, setter(strip_option, into))]
    locked_by: Option<String>,
    #[builder(default = "Utc::now()")]
    created_at: DateTime<Utc>,
}

impl Job {
    /// Creates a new builder for constructing a `Job`.
    pub fn builder() -> JobBuilder {
        JobBuilder::default()
    }

    /// Splits the `method` column into its receiver and message.
    pub fn method_ref(&self) -> Result<MethodRef, MethodRefError> {
        self.method.parse()
    }

    /// The argument list as positional values.
    ///
    /// Rows written by other producers may carry a bare scalar or object
    /// instead of an array; such a value is treated as the only argument.
    pub fn arg_list(&self) -> Vec<Value> {
        match &self.args {
            Value::Array(values) => values.clone(),
            Value::Null => Vec::new(),
            other => vec![other.clone()],
        }
    }
}

impl JobBuilder {
    /// Builds the Job with all configured values.
    ///
    /// # Panics
    ///
    /// Panics if `method` was never set.
    pub fn build(self) -> Job {
        self.build_internal()
            .expect("Job::builder() requires at least a method")
    }
}
