use std::sync::Arc;

use getset::Getters;
use pgq_worker_job::Job;

use crate::conn::{ConnectionManager, PgConnector};
use crate::errors::Result;
use crate::queue::Queue;
use crate::sql::{delete_job::delete_job, lock_job::lock_job, refresh_heartbeat::refresh_heartbeat};

/// Default number of oldest unlocked jobs a worker considers when locking.
pub const DEFAULT_TOP_BOUND: u32 = 9;

/// A queue stored in the `jobs` table, reached through the worker's
/// connection manager.
#[derive(Getters, Clone)]
#[getset(get = "pub")]
pub struct PgQueue {
    #[getset(skip)]
    conn: Arc<ConnectionManager<PgConnector>>,
    escaped_schema: String,
    #[getset(skip)]
    name: String,
    /// How many of the oldest unlocked jobs a lock considers
    top_bound: u32,
    /// Written into `locked_by` on claimed jobs
    worker_id: String,
}

impl PgQueue {
    pub fn new(
        conn: Arc<ConnectionManager<PgConnector>>,
        escaped_schema: impl Into<String>,
        name: impl Into<String>,
        top_bound: u32,
        worker_id: impl Into<String>,
    ) -> Self {
        PgQueue {
            conn,
            escaped_schema: escaped_schema.into(),
            name: name.into(),
            top_bound: top_bound.max(1),
            worker_id: worker_id.into(),
        }
    }
}

impl Queue for PgQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lock(&self) -> Result<Option<Job>> {
        lock_job(
            &self.conn,
            &self.escaped_schema,
            &self.name,
            i64::from(self.top_bound),
            &self.worker_id,
        )
        .await
    }

    async fn delete(&self, job_id: i64) -> Result<()> {
        delete_job(&self.conn, &self.escaped_schema, job_id).await
    }

    async fn heartbeat(&self, heartbeat_id: &str, job_id: i64) -> Result<bool> {
        refresh_heartbeat(
            &self.conn,
            &self.escaped_schema,
            &self.worker_id,
            heartbeat_id,
            job_id,
        )
        .await
    }
}
