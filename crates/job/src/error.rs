use thiserror::Error;

use crate::method::{MethodRef, MethodRefError};

/// Why a single job did not complete successfully.
///
/// Every variant is contained to the job that produced it: the worker reports
/// it to the failure hook, deletes the job and moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// The `method` column could not be split into receiver and message
    #[error("Invalid job method: {0}")]
    InvalidMethod(#[from] MethodRefError),
    /// No handler is registered for the receiver
    #[error("No handler registered for receiver '{}' (method '{}')", .0.receiver(), .0)]
    UnknownReceiver(MethodRef),
    /// The receiver is known but does not answer this message
    #[error("Receiver '{}' has no handler for message '{}'", .0.receiver(), .0.message())]
    UnknownMessage(MethodRef),
    /// The argument list could not be decoded into the handler's input
    #[error("Could not decode arguments for '{method}': {reason}")]
    InvalidArguments { method: String, reason: String },
    /// The handler ran and returned an error
    #[error("Job returned the following error: {0}")]
    Failed(String),
    /// The handler panicked
    #[error("Job panicked: {0}")]
    Panicked(String),
}

impl JobError {
    pub fn is_dispatch_error(&self) -> bool {
        matches!(
            self,
            JobError::InvalidMethod(_)
                | JobError::UnknownReceiver(_)
                | JobError::UnknownMessage(_)
                | JobError::InvalidArguments { .. }
        )
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, JobError::Panicked(_))
    }
}
