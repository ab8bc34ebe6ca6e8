use std::fmt::Debug;

/// Conversion of whatever a handler returns into the worker's view of it.
///
/// Handlers may return `()` when they cannot fail, or any `Result<(), E>`
/// whose error is `Debug`.
pub trait IntoJobResult {
    fn into_job_result(self) -> Result<(), String>;
}

impl IntoJobResult for () {
    fn into_job_result(self) -> Result<(), String> {
        Ok(())
    }
}

impl<E: Debug> IntoJobResult for Result<(), E> {
    fn into_job_result(self) -> Result<(), String> {
        self.map_err(|e| format!("{e:?}"))
    }
}
