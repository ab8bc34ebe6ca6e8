use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// An action reference split into the receiver it targets and the message
/// sent to it, e.g. `Reporter.run`.
///
/// The receiver is the first `.` segment and the message the last one, so
/// `Billing.Invoice.send` sends `send` to `Billing`. Middle segments are
/// dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodRef {
    receiver: String,
    message: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MethodRefError {
    #[error("Method '{0}' has no receiver/message separator (expected `Receiver.message`)")]
    MissingSeparator(String),
    #[error("Method '{0}' has an empty receiver")]
    EmptyReceiver(String),
    #[error("Method '{0}' has an empty message")]
    EmptyMessage(String),
}

impl MethodRef {
    pub fn new(receiver: impl Into<String>, message: impl Into<String>) -> Self {
        MethodRef {
            receiver: receiver.into(),
            message: message.into(),
        }
    }

    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl FromStr for MethodRef {
    type Err = MethodRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let missing_separator = || MethodRefError::MissingSeparator(s.to_string());
        let (receiver, _) = s.split_once('.').ok_or_else(missing_separator)?;
        let (_, message) = s.rsplit_once('.').ok_or_else(missing_separator)?;

        if receiver.is_empty() {
            return Err(MethodRefError::EmptyReceiver(s.to_string()));
        }
        if message.is_empty() {
            return Err(MethodRefError::EmptyMessage(s.to_string()));
        }

        Ok(MethodRef::new(receiver, message))
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.receiver, self.message)
    }
}
