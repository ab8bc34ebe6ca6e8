use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use futures::FutureExt;
use pgq_worker_ctx::JobContext;
use pgq_worker_job::{Job, JobError, MethodRef};
use pgq_worker_job_handler::{run_handler, HandlerFn, IntoJobResult, JobHandler};
use serde_json::Value;

/// Future returned by [`JobRegistry::dispatch`].
pub type DispatchFuture = Pin<Box<dyn Future<Output = Result<(), JobError>> + Send>>;

/// The closed set of actions a worker can run, keyed by `Receiver.message`.
///
/// ```
/// use pgq_worker::JobRegistry;
///
/// let mut registry = JobRegistry::new();
/// registry.define_fn("Reporter.run", |_ctx, args| async move {
///     println!("report {:?}", args);
/// });
/// assert!(registry.contains("Reporter.run"));
/// ```
#[derive(Default)]
pub struct JobRegistry {
    handlers: HashMap<MethodRef, HandlerFn>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a typed handler under [`JobHandler::METHOD`].
    ///
    /// # Panics
    ///
    /// Panics if `METHOD` is not of the form `Receiver.message`.
    pub fn define_job<T: JobHandler>(&mut self) -> &mut Self {
        let handler = |ctx: JobContext, args: Vec<Value>| run_handler::<T>(ctx, args).boxed();
        self.insert(T::METHOD, Box::new(handler))
    }

    /// Registers a closure taking the job context and the positional
    /// arguments.
    ///
    /// # Panics
    ///
    /// Panics if `method` is not of the form `Receiver.message`.
    pub fn define_fn<F, Fut, R>(&mut self, method: &str, job_fn: F) -> &mut Self
    where
        F: Fn(JobContext, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoJobResult,
    {
        let handler = move |ctx: JobContext, args: Vec<Value>| {
            job_fn(ctx, args)
                .map(|result| result.into_job_result().map_err(JobError::Failed))
                .boxed()
        };
        self.insert(method, Box::new(handler))
    }

    fn insert(&mut self, method: &str, handler: HandlerFn) -> &mut Self {
        let method_ref = method
            .parse::<MethodRef>()
            .unwrap_or_else(|e| panic!("Cannot register job handler: {e}"));
        self.handlers.insert(method_ref, handler);
        self
    }

    pub fn contains(&self, method: &str) -> bool {
        method
            .parse::<MethodRef>()
            .is_ok_and(|method_ref| self.handlers.contains_key(&method_ref))
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodRef> {
        self.handlers.keys()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Finds the handler for a job's method.
    ///
    /// A receiver with no handler at all is reported apart from a known
    /// receiver that does not answer the message.
    pub fn resolve(&self, job: &Job) -> Result<&HandlerFn, JobError> {
        let method_ref = job.method_ref()?;

        if let Some(handler) = self.handlers.get(&method_ref) {
            return Ok(handler);
        }

        let receiver_known = self
            .handlers
            .keys()
            .any(|known| known.receiver() == method_ref.receiver());
        if receiver_known {
            Err(JobError::UnknownMessage(method_ref))
        } else {
            Err(JobError::UnknownReceiver(method_ref))
        }
    }

    /// Starts the job's handler with its argument list. Dispatch errors
    /// come back through the returned future like any other job failure.
    pub fn dispatch(&self, ctx: JobContext) -> DispatchFuture {
        match self.resolve(ctx.job()) {
            Ok(handler) => {
                let args = ctx.job().arg_list();
                handler(ctx, args)
            }
            Err(e) => futures::future::ready(Err(e)).boxed(),
        }
    }
}
