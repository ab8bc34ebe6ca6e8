use std::time::Duration;

use sqlx::postgres::{
    PgArguments, PgConnectOptions, PgListener, PgPool, PgPoolOptions, PgRow,
};
use sqlx::query::Query;
use sqlx::{Executor, Postgres};
use tracing::debug;

use super::{Connector, Notification, Session, SqlParam};
use crate::config::ConnectionSource;
use crate::errors::{PgqWorkerError, Result};

pub const DEFAULT_APP_NAME: &str = "pgq_worker";

/// Opens PostgreSQL sessions from resolved connect options.
#[derive(Debug, Clone)]
pub struct PgConnector {
    options: Option<PgConnectOptions>,
    app_name: String,
}

impl PgConnector {
    pub fn new(options: PgConnectOptions) -> Self {
        PgConnector {
            options: Some(options),
            app_name: DEFAULT_APP_NAME.to_string(),
        }
    }

    /// A connector with nothing to connect to. Every connect attempt fails
    /// with [`PgqWorkerError::MissingConnectionConfig`].
    pub fn unconfigured() -> Self {
        PgConnector {
            options: None,
            app_name: DEFAULT_APP_NAME.to_string(),
        }
    }

    pub fn from_url(url: &str) -> Result<Self> {
        Self::from_source(&ConnectionSource::Url(url.to_string()))
    }

    pub fn from_source(source: &ConnectionSource) -> Result<Self> {
        Ok(Self::new(source.connect_options()?))
    }

    /// Resolves the connection from the environment. An unresolved
    /// environment is not an error here; it surfaces on first connect.
    pub fn from_env() -> Result<Self> {
        match ConnectionSource::from_env() {
            Some(source) => Self::from_source(&source),
            None => Ok(Self::unconfigured()),
        }
    }

    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.options.is_some()
    }

    pub fn connect_options(&self) -> Option<&PgConnectOptions> {
        self.options.as_ref()
    }
}

impl Connector for PgConnector {
    type Session = PgSession;

    async fn connect(&self) -> Result<PgSession> {
        let options = self
            .options
            .clone()
            .ok_or(PgqWorkerError::MissingConnectionConfig)?
            .application_name(&self.app_name);

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_lazy_with(options);
        let listener = PgListener::connect_with(&pool).await?;

        Ok(PgSession { listener, pool })
    }
}

/// A PostgreSQL session.
///
/// The listener owns the one physical connection: statements run through it
/// and notifications that arrive meanwhile are buffered until read.
pub struct PgSession {
    listener: PgListener,
    pool: PgPool,
}

fn bind_param<'q>(
    query: Query<'q, Postgres, PgArguments>,
    param: &SqlParam,
) -> Query<'q, Postgres, PgArguments> {
    match param {
        SqlParam::Null => query.bind(None::<String>),
        SqlParam::Bool(value) => query.bind(*value),
        SqlParam::Int(value) => query.bind(*value),
        SqlParam::Text(value) => query.bind(value.clone()),
        SqlParam::Json(value) => query.bind(value.clone()),
        SqlParam::Timestamp(value) => query.bind(*value),
    }
}

impl Session for PgSession {
    type Row = PgRow;

    async fn run(
        &mut self,
        statement: &str,
        params: &[SqlParam],
    ) -> core::result::Result<Vec<PgRow>, sqlx::Error> {
        if params.is_empty() {
            return Executor::fetch_all(&mut self.listener, sqlx::raw_sql(statement)).await;
        }

        let query = params.iter().fold(sqlx::query(statement), bind_param);
        Executor::fetch_all(&mut self.listener, query).await
    }

    async fn wait_for_notification(
        &mut self,
        timeout: Duration,
    ) -> core::result::Result<Option<Notification>, sqlx::Error> {
        match tokio::time::timeout(timeout, self.listener.recv()).await {
            Ok(notification) => {
                let notification = notification?;
                Ok(Some(Notification {
                    channel: notification.channel().to_string(),
                    payload: notification.payload().to_string(),
                }))
            }
            Err(_) => Ok(None),
        }
    }

    fn next_buffered(&mut self) -> Option<Notification> {
        self.listener
            .next_buffered()
            .map(|notification| Notification {
                channel: notification.channel().to_string(),
                payload: notification.payload().to_string(),
            })
    }

    async fn close(self) {
        debug!("Closing database session");
        drop(self.listener);
        self.pool.close().await;
    }
}
