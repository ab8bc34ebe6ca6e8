//! The process-wide database connection.
//!
//! A [`ConnectionManager`] owns exactly one session, created lazily on first
//! use and serialized behind an async mutex so that at most one statement is
//! in flight. Any execution error closes and drops the session; the next
//! call connects a fresh one.

mod notify;
mod pg;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::errors::{PgqWorkerError, Result};

pub use pg::{PgConnector, PgSession, DEFAULT_APP_NAME};

/// Default bound of a single [`ConnectionManager::wait`].
pub const DEFAULT_WAIT_TIME: Duration = Duration::from_secs(5);

/// A positional statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Json(Value),
    Timestamp(DateTime<Utc>),
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        SqlParam::Text(value)
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::Int(value)
    }
}

impl From<bool> for SqlParam {
    fn from(value: bool) -> Self {
        SqlParam::Bool(value)
    }
}

impl From<Value> for SqlParam {
    fn from(value: Value) -> Self {
        SqlParam::Json(value)
    }
}

/// Rows returned by [`ConnectionManager::execute`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput<R> {
    /// The statement produced no rows
    None,
    One(R),
    Many(Vec<R>),
}

impl<R> QueryOutput<R> {
    fn from_rows(mut rows: Vec<R>) -> Self {
        match rows.len() {
            0 => QueryOutput::None,
            1 => QueryOutput::One(rows.remove(0)),
            _ => QueryOutput::Many(rows),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, QueryOutput::None)
    }

    pub fn len(&self) -> usize {
        match self {
            QueryOutput::None => 0,
            QueryOutput::One(_) => 1,
            QueryOutput::Many(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.is_none()
    }

    pub fn into_rows(self) -> Vec<R> {
        match self {
            QueryOutput::None => Vec::new(),
            QueryOutput::One(row) => vec![row],
            QueryOutput::Many(rows) => rows,
        }
    }

    /// First row, if any.
    pub fn into_first(self) -> Option<R> {
        self.into_rows().into_iter().next()
    }
}

/// A notification received on a listened channel. The payload is carried
/// along but the worker never looks at it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: String,
    pub payload: String,
}

/// One physical database session.
pub trait Session: Send + 'static {
    type Row: Send + 'static;

    /// Runs a statement. Without params it goes through the simple query
    /// protocol, so it may hold several `;` separated statements.
    fn run(
        &mut self,
        statement: &str,
        params: &[SqlParam],
    ) -> impl Future<Output = core::result::Result<Vec<Self::Row>, sqlx::Error>> + Send;

    /// Waits up to `timeout` for one notification on a listened channel.
    fn wait_for_notification(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = core::result::Result<Option<Notification>, sqlx::Error>> + Send;

    /// Pops a notification that already arrived, without waiting.
    fn next_buffered(&mut self) -> Option<Notification>;

    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Opens sessions.
pub trait Connector: Send + Sync + 'static {
    type Session: Session;

    fn connect(&self) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// Row type produced by a connector's sessions.
pub type RowOf<C> = <<C as Connector>::Session as Session>::Row;

/// Serialized access to a single lazily established session.
pub struct ConnectionManager<C: Connector = PgConnector> {
    connector: C,
    session: Mutex<Option<C::Session>>,
    in_transaction: AtomicBool,
    wait_time: Duration,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C) -> Self {
        ConnectionManager {
            connector,
            session: Mutex::new(None),
            in_transaction: AtomicBool::new(false),
            wait_time: DEFAULT_WAIT_TIME,
        }
    }

    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }

    pub fn wait_time(&self) -> Duration {
        self.wait_time
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Runs one statement on the session, connecting first if needed.
    ///
    /// On error the session is closed and dropped before the error is
    /// returned. Nothing is retried.
    pub async fn execute(&self, statement: &str, params: &[SqlParam]) -> Result<QueryOutput<RowOf<C>>> {
        debug!(at = "exec_sql", sql = statement);
        let mut guard = self.session.lock().await;
        let session = self.ensure_session(&mut guard).await?;

        let result = session.run(statement, params).await;
        match result {
            Ok(rows) => {
                self.track_transaction(statement);
                Ok(QueryOutput::from_rows(rows))
            }
            Err(e) => {
                error!(at = "exec_sql", sql = statement, error = %e, "Statement failed");
                self.discard(&mut guard).await;
                Err(e.into())
            }
        }
    }

    /// Runs `body` between `BEGIN` and `COMMIT`.
    ///
    /// An `Err` from the body, or a panic inside it, issues `ROLLBACK` and is
    /// passed on unchanged.
    pub async fn transaction<T, E, F, Fut>(&self, body: F) -> core::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = core::result::Result<T, E>>,
        E: From<PgqWorkerError>,
    {
        self.execute("BEGIN", &[]).await?;

        match AssertUnwindSafe(body()).catch_unwind().await {
            Ok(Ok(value)) => {
                self.execute("COMMIT", &[]).await?;
                Ok(value)
            }
            Ok(Err(e)) => {
                self.rollback().await;
                Err(e)
            }
            Err(panic) => {
                self.rollback().await;
                std::panic::resume_unwind(panic)
            }
        }
    }

    /// Whether no transaction is open on the session.
    pub fn transaction_idle(&self) -> bool {
        !self.in_transaction.load(Ordering::SeqCst)
    }

    /// Whether a session is currently established.
    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Closes the current session, if any.
    pub async fn disconnect(&self) {
        let mut guard = self.session.lock().await;
        if guard.is_some() {
            info!(at = "disconnect");
        }
        self.discard(&mut guard).await;
    }

    async fn rollback(&self) {
        if let Err(e) = self.execute("ROLLBACK", &[]).await {
            warn!(error = %e, "Rollback failed, connection was discarded");
        }
    }

    async fn ensure_session<'s>(
        &self,
        slot: &'s mut Option<C::Session>,
    ) -> Result<&'s mut C::Session> {
        let session = match slot.take() {
            Some(session) => session,
            None => {
                info!(at = "establish_conn");
                self.connector.connect().await.inspect_err(|e| {
                    error!(at = "establish_conn", error = %e, "Could not connect");
                })?
            }
        };
        Ok(slot.insert(session))
    }

    async fn discard(&self, slot: &mut Option<C::Session>) {
        self.in_transaction.store(false, Ordering::SeqCst);
        if let Some(session) = slot.take() {
            session.close().await;
        }
    }

    fn track_transaction(&self, statement: &str) {
        for part in statement.split(';') {
            let keyword = part
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_ascii_lowercase();

            match keyword.as_str() {
                "begin" | "start" => self.in_transaction.store(true, Ordering::SeqCst),
                "commit" | "rollback" | "end" | "abort" => {
                    self.in_transaction.store(false, Ordering::SeqCst)
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_output_from_rows() {
        assert_eq!(QueryOutput::<i32>::from_rows(vec![]), QueryOutput::None);
        assert_eq!(QueryOutput::from_rows(vec![1]), QueryOutput::One(1));
        assert_eq!(QueryOutput::from_rows(vec![1, 2]), QueryOutput::Many(vec![1, 2]));
        assert_eq!(QueryOutput::from_rows(vec![1, 2]).into_first(), Some(1));
        assert_eq!(QueryOutput::One(3).len(), 1);
    }

    #[test]
    fn test_sql_param_conversions() {
        assert_eq!(SqlParam::from("a"), SqlParam::Text("a".into()));
        assert_eq!(SqlParam::from(3_i64), SqlParam::Int(3));
        assert_eq!(SqlParam::from(true), SqlParam::Bool(true));
    }
}
