use std::future::Future;
use std::pin::Pin;

use pgq_worker_ctx::JobContext;
use pgq_worker_job::JobError;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::job_result::IntoJobResult;

/// Type-erased handler as stored in a registry.
///
/// Takes the job context and the positional argument list and resolves once
/// the job body has finished.
pub type HandlerFn = Box<
    dyn Fn(JobContext, Vec<Value>) -> Pin<Box<dyn Future<Output = Result<(), JobError>> + Send>>
        + Send
        + Sync,
>;

/// A job handler decoded from the job's argument list.
///
/// `Self` is deserialized from the JSON array of arguments, so a struct with
/// named fields takes its fields positionally:
///
/// ```
/// use pgq_worker_ctx::JobContext;
/// use pgq_worker_job_handler::{IntoJobResult, JobHandler};
/// use serde::Deserialize;
///
/// // enqueued as method "Reporter.run", args [42]
/// #[derive(Deserialize)]
/// struct ReporterRun {
///     report_id: i64,
/// }
///
/// impl JobHandler for ReporterRun {
///     const METHOD: &'static str = "Reporter.run";
///
///     async fn run(self, _ctx: JobContext) -> impl IntoJobResult {
///         println!("running report {}", self.report_id);
///     }
/// }
/// ```
pub trait JobHandler: DeserializeOwned + Send + 'static {
    /// Action reference this handler answers, `Receiver.message`
    const METHOD: &'static str;

    fn run(self, ctx: JobContext) -> impl Future<Output = impl IntoJobResult> + Send;
}

/// Decodes `args` into `T` and runs it.
pub async fn run_handler<T: JobHandler>(ctx: JobContext, args: Vec<Value>) -> Result<(), JobError> {
    let handler: T = decode_args(args).map_err(|e| JobError::InvalidArguments {
        method: T::METHOD.to_string(),
        reason: e.to_string(),
    })?;

    handler
        .run(ctx)
        .await
        .into_job_result()
        .map_err(JobError::Failed)
}

/// Decodes the argument list positionally. A list holding one object that
/// does not fit positionally is decoded by field name instead, which is the
/// shape a serialized handler struct is stored in.
fn decode_args<T: DeserializeOwned>(mut args: Vec<Value>) -> serde_json::Result<T> {
    if !matches!(args.as_slice(), [Value::Object(_)]) {
        return serde_json::from_value(Value::Array(args));
    }

    match serde_json::from_value(Value::Array(args.clone())) {
        Ok(handler) => Ok(handler),
        Err(_) => serde_json::from_value(args.remove(0)),
    }
}
