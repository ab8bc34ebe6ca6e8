//! Runs as its own test binary so the isolated-child environment variable
//! cannot leak into the other worker tests.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use helpers::{FakeConnector, FakeQueue, RecordingHooks};
use pgq_worker::{JobRegistry, Worker, ISOLATED_CHILD_ENV};
use serde_json::json;

mod helpers;

#[tokio::test]
async fn isolated_child_runs_one_cycle_and_returns() {
    helpers::enable_logs().await;
    std::env::set_var(ISOLATED_CHILD_ENV, "1");

    let connector = FakeConnector::new();
    let queue = FakeQueue::new("default");
    let hooks = Arc::new(RecordingHooks::default());
    let mut registry = JobRegistry::new();
    registry.define_fn("Reporter.run", |_ctx, _args| async {});

    let first = queue.push("Reporter.run", json!([1]));
    queue.push("Reporter.run", json!([2]));

    let worker = Worker::from_parts(
        connector.manager(Duration::from_millis(10)),
        vec![queue.clone()],
        registry,
    )
    .with_hooks(hooks.clone())
    .with_heartbeat_interval(Duration::from_millis(10));

    let result = tokio::time::timeout(Duration::from_secs(5), worker.run())
        .await
        .expect("an isolated child should return after one cycle");

    assert!(result.is_ok(), "{result:?}");
    assert_eq!(hooks.setups.load(Ordering::SeqCst), 1);
    assert_eq!(queue.deleted(), vec![first]);
    assert_eq!(queue.pending(), 1);
}
