#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pgq_worker::{
    ConnectionManager, Connector, Job, JobFailure, LifeCycleEvent, Notification,
    PgConnector, PgqWorkerError, Queue, Session, SqlParam, WorkerHooks,
};
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tokio::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub async fn enable_logs() {
    static ONCE: OnceCell<()> = OnceCell::const_new();

    ONCE.get_or_init(|| async {
        let fmt_layer = tracing_subscriber::fmt::layer().with_test_writer();
        // Log level set to debug except for sqlx set at warn (to not show all sql requests)
        let filter_layer = EnvFilter::try_new("debug,sqlx=warn").unwrap();

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .init();
    })
    .await;
}

/// Shared state behind [`FakeConnector`] and the sessions it opens.
#[derive(Default)]
pub struct FakeDb {
    pub statements: Mutex<Vec<String>>,
    pub params: Mutex<Vec<Vec<SqlParam>>>,
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub waits: AtomicUsize,
    pub fail_connect: AtomicBool,
    /// The next statement containing this text fails
    pub fail_statement: Mutex<Option<String>>,
    pub fail_wait: AtomicBool,
    /// Rows handed out to the next statements, one entry per statement
    pub results: Mutex<VecDeque<Vec<i64>>>,
    /// Delivered by the next wait
    pub incoming: Mutex<VecDeque<Notification>>,
    /// Already arrived, read without waiting
    pub buffered: Mutex<VecDeque<Notification>>,
}

impl FakeDb {
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    pub fn fail_next(&self, statement: &str) {
        *self.fail_statement.lock().unwrap() = Some(statement.to_string());
    }

    pub fn push_result(&self, rows: Vec<i64>) {
        self.results.lock().unwrap().push_back(rows);
    }

    pub fn notify(&self, channel: &str) {
        self.incoming.lock().unwrap().push_back(notification(channel));
    }

    pub fn buffer(&self, channel: &str) {
        self.buffered.lock().unwrap().push_back(notification(channel));
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn waits(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }
}

fn notification(channel: &str) -> Notification {
    Notification {
        channel: channel.to_string(),
        payload: String::new(),
    }
}

#[derive(Clone, Default)]
pub struct FakeConnector {
    pub db: Arc<FakeDb>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn manager(&self, wait_time: Duration) -> Arc<ConnectionManager<FakeConnector>> {
        Arc::new(ConnectionManager::new(self.clone()).with_wait_time(wait_time))
    }
}

impl Connector for FakeConnector {
    type Session = FakeSession;

    async fn connect(&self) -> Result<FakeSession, PgqWorkerError> {
        if self.db.fail_connect.load(Ordering::SeqCst) {
            return Err(PgqWorkerError::MissingConnectionConfig);
        }
        self.db.connects.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSession {
            db: self.db.clone(),
        })
    }
}

pub struct FakeSession {
    db: Arc<FakeDb>,
}

impl Session for FakeSession {
    type Row = i64;

    async fn run(&mut self, statement: &str, params: &[SqlParam]) -> Result<Vec<i64>, sqlx::Error> {
        self.db.statements.lock().unwrap().push(statement.to_string());
        self.db.params.lock().unwrap().push(params.to_vec());

        let mut fail_statement = self.db.fail_statement.lock().unwrap();
        if fail_statement
            .as_deref()
            .is_some_and(|fail| statement.contains(fail))
        {
            *fail_statement = None;
            return Err(sqlx::Error::Protocol(format!("simulated failure on {statement}")));
        }
        drop(fail_statement);

        Ok(self.db.results.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn wait_for_notification(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Notification>, sqlx::Error> {
        self.db.waits.fetch_add(1, Ordering::SeqCst);
        if self.db.fail_wait.load(Ordering::SeqCst) {
            return Err(sqlx::Error::Protocol("simulated connection loss".into()));
        }

        let incoming = self.db.incoming.lock().unwrap().pop_front();
        match incoming {
            Some(notification) => Ok(Some(notification)),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
        }
    }

    fn next_buffered(&mut self) -> Option<Notification> {
        self.db.buffered.lock().unwrap().pop_front()
    }

    async fn close(self) {
        self.db.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory queue. Clones share their state.
#[derive(Clone)]
pub struct FakeQueue {
    name: String,
    pub state: Arc<FakeQueueState>,
}

#[derive(Default)]
pub struct FakeQueueState {
    pub pending: Mutex<VecDeque<Job>>,
    pub locked: Mutex<HashSet<i64>>,
    pub deleted: Mutex<Vec<i64>>,
    pub lock_calls: AtomicUsize,
    pub heartbeats: Mutex<Vec<(String, i64)>>,
    /// What a heartbeat reports once it gets through
    pub claim_held: AtomicBool,
    /// Heartbeats fail outright while this is non-zero, counting down
    pub heartbeat_errors: AtomicUsize,
}

static NEXT_JOB_ID: AtomicI64 = AtomicI64::new(1);

impl FakeQueue {
    pub fn new(name: &str) -> Self {
        let state = FakeQueueState::default();
        state.claim_held.store(true, Ordering::SeqCst);
        FakeQueue {
            name: name.to_string(),
            state: Arc::new(state),
        }
    }

    pub fn push(&self, method: &str, args: Value) -> i64 {
        let id = NEXT_JOB_ID.fetch_add(1, Ordering::SeqCst);
        let job = Job::builder()
            .id(id)
            .q_name(self.name.clone())
            .method(method)
            .args(args)
            .build();
        self.state.pending.lock().unwrap().push_back(job);
        id
    }

    pub fn pending(&self) -> usize {
        self.state.pending.lock().unwrap().len()
    }

    pub fn deleted(&self) -> Vec<i64> {
        self.state.deleted.lock().unwrap().clone()
    }

    pub fn lock_calls(&self) -> usize {
        self.state.lock_calls.load(Ordering::SeqCst)
    }

    pub fn heartbeats(&self) -> Vec<(String, i64)> {
        self.state.heartbeats.lock().unwrap().clone()
    }

    pub fn lose_claims(&self) {
        self.state.claim_held.store(false, Ordering::SeqCst);
    }
}

impl Queue for FakeQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lock(&self) -> Result<Option<Job>, PgqWorkerError> {
        self.state.lock_calls.fetch_add(1, Ordering::SeqCst);
        let job = self.state.pending.lock().unwrap().pop_front();
        if let Some(job) = &job {
            self.state.locked.lock().unwrap().insert(*job.id());
        }
        Ok(job)
    }

    async fn delete(&self, job_id: i64) -> Result<(), PgqWorkerError> {
        self.state.locked.lock().unwrap().remove(&job_id);
        self.state.deleted.lock().unwrap().push(job_id);
        Ok(())
    }

    async fn heartbeat(&self, heartbeat_id: &str, job_id: i64) -> Result<bool, PgqWorkerError> {
        self.state
            .heartbeats
            .lock()
            .unwrap()
            .push((heartbeat_id.to_string(), job_id));

        let failing = self
            .state
            .heartbeat_errors
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PgqWorkerError::SqlError(sqlx::Error::PoolTimedOut));
        }

        Ok(self.state.claim_held.load(Ordering::SeqCst)
            && self.state.locked.lock().unwrap().contains(&job_id))
    }
}

/// Hooks that record everything they see.
#[derive(Default)]
pub struct RecordingHooks {
    pub failures: Mutex<Vec<JobFailure>>,
    pub events: Mutex<Vec<LifeCycleEvent>>,
    pub setups: AtomicUsize,
}

impl RecordingHooks {
    pub fn failures(&self) -> Vec<JobFailure> {
        self.failures.lock().unwrap().clone()
    }

    pub fn event_names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|event| match event {
                LifeCycleEvent::Locked(_) => "locked",
                LifeCycleEvent::Completed(_) => "completed",
                LifeCycleEvent::Failed(_) => "failed",
                LifeCycleEvent::Deleted(_) => "deleted",
                LifeCycleEvent::LivenessLost(_) => "liveness_lost",
            })
            .collect()
    }

    pub fn locked_queues(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                LifeCycleEvent::Locked(locked) => Some(locked.q_name.clone()),
                _ => None,
            })
            .collect()
    }
}

impl WorkerHooks for RecordingHooks {
    fn on_failure(&self, failure: JobFailure) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.failures.lock().unwrap().push(failure);
        })
    }

    fn setup_child(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.setups.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn on_event(&self, event: LifeCycleEvent) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.events.lock().unwrap().push(event);
        })
    }
}

/// Polls `condition` every few milliseconds until it holds.
///
/// # Panics
///
/// Panics if it does not hold within `timeout`.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(timeout, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

/// Like [`wait_until`], for conditions that need to query something.
pub async fn wait_until_async<F, Fut>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(timeout, async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

#[derive(Clone, Debug)]
pub struct TestDatabase {
    pub source_pool: PgPool,
    pub test_pool: PgPool,
    pub test_options: PgConnectOptions,
    pub name: String,
}

impl TestDatabase {
    async fn drop(&self) {
        self.test_pool.close().await;
        sqlx::query(&format!("DROP DATABASE IF EXISTS {} WITH (FORCE)", self.name))
            .execute(&self.source_pool)
            .await
            .expect("Failed to drop test database");
    }

    pub fn connector(&self) -> PgConnector {
        PgConnector::new(self.test_options.clone())
    }

    pub fn manager(&self) -> Arc<ConnectionManager<PgConnector>> {
        Arc::new(ConnectionManager::new(self.connector()))
    }

    pub async fn utils(&self) -> pgq_worker::QueueUtils {
        let utils = pgq_worker::QueueUtils::for_schema(self.test_pool.clone(), "pgq_worker")
            .await
            .expect("Failed to escape schema");
        utils.migrate().await.expect("Failed to migrate");
        utils
    }
}

pub async fn create_test_database(db_url: &str) -> TestDatabase {
    let mut pg_conn_options: PgConnectOptions =
        db_url.parse().expect("Failed to parse DATABASE_URL");
    pg_conn_options = pg_conn_options.application_name("__test_pgq_worker");

    let pg_pool = PgPoolOptions::new()
        .max_connections(4)
        .connect_with(pg_conn_options.clone())
        .await
        .expect("Failed to connect to database");

    let db_id = uuid::Uuid::now_v7();
    let db_name = format!("__test_pgq_worker_{}", db_id.simple());

    sqlx::query(&format!("CREATE DATABASE {}", db_name))
        .execute(&pg_pool)
        .await
        .expect("Failed to create test database");

    let test_options = pg_conn_options.database(&db_name);

    let test_pool = PgPoolOptions::new()
        .max_connections(8)
        .connect_with(test_options.clone())
        .await
        .expect("Failed to connect to test database");

    TestDatabase {
        source_pool: pg_pool,
        test_pool,
        test_options,
        name: db_name,
    }
}

/// Runs `test_fn` against a throw-away database. Skipped when
/// `DATABASE_URL` is not set.
pub async fn with_test_db<F, Fut>(test_fn: F)
where
    F: FnOnce(TestDatabase) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let Ok(db_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL is not set, skipping PostgreSQL test");
        return;
    };

    let test_db = create_test_database(&db_url).await;
    let test_db_2 = test_db.clone();

    let result = tokio::spawn(async move {
        test_fn(test_db_2).await;
    })
    .await;

    test_db.drop().await;
    result.expect("Test failed");
}
