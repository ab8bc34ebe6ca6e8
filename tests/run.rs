use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use helpers::{wait_until_async, with_test_db, RecordingHooks};
use pgq_worker::{JobContext, WorkerOptions};
use serde_json::{json, Value};
use sqlx::query_scalar;

mod helpers;

#[tokio::test]
async fn worker_runs_enqueued_jobs_and_deletes_them() {
    with_test_db(|test_db| async move {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let seen: Arc<Mutex<Vec<Value>>> = Arc::default();

        let worker = WorkerOptions::default()
            .connector(test_db.connector())
            .wait_time(Duration::from_millis(200))
            .heartbeat_interval(Duration::from_millis(50))
            .listen_os_shutdown_signals(false)
            .define_fn("Reporter.run", {
                let seen = seen.clone();
                move |_ctx: JobContext, args: Vec<Value>| {
                    seen.lock().unwrap().push(Value::Array(args));
                    async {
                        CALLS.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
            .init()
            .await
            .expect("Failed to create worker");
        let utils = worker.create_utils().expect("Failed to create utils");
        let worker = Arc::new(worker);

        let handle = tokio::spawn({
            let worker = worker.clone();
            async move { worker.run().await }
        });

        utils
            .enqueue("default", "Reporter.run", json!([42]))
            .await
            .unwrap();
        utils
            .enqueue("default", "Reporter.run", json!("single"))
            .await
            .unwrap();

        wait_until_async(Duration::from_secs(10), || {
            let utils = utils.clone();
            async move { utils.count(None).await.unwrap() == 0 }
        })
        .await;
        worker.stop();
        handle.await.unwrap().expect("worker should stop cleanly");

        assert_eq!(CALLS.load(Ordering::SeqCst), 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![json!([42]), json!(["single"])]
        );
    })
    .await;
}

#[tokio::test]
async fn failed_jobs_go_to_the_failure_hook_and_are_deleted() {
    with_test_db(|test_db| async move {
        let hooks = Arc::new(RecordingHooks::default());
        let worker = WorkerOptions::default()
            .connector(test_db.connector())
            .wait_time(Duration::from_millis(200))
            .listen_os_shutdown_signals(false)
            .hooks(hooks.clone())
            .define_fn("Mailer.deliver", |_ctx, _args| async {
                Err::<(), _>("smtp down")
            })
            .init()
            .await
            .expect("Failed to create worker");
        let utils = worker.create_utils().expect("Failed to create utils");

        let failing = utils
            .enqueue("default", "Mailer.deliver", json!(["someone@example.com"]))
            .await
            .unwrap();
        let unknown = utils
            .enqueue("default", "Billing.charge", json!([10]))
            .await
            .unwrap();

        worker.work().await.unwrap();
        worker.work().await.unwrap();

        assert_eq!(utils.count(None).await.unwrap(), 0);
        let failures = hooks.failures();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].job.id(), failing.id());
        assert!(!failures[0].error.is_dispatch_error());
        assert_eq!(failures[1].job.id(), unknown.id());
        assert!(failures[1].error.is_dispatch_error());

        worker.connection().disconnect().await;
    })
    .await;
}

#[tokio::test]
async fn worker_serves_its_queues_in_order() {
    with_test_db(|test_db| async move {
        let hooks = Arc::new(RecordingHooks::default());
        let worker = WorkerOptions::default()
            .connector(test_db.connector())
            .queue("high")
            .add_queue("low")
            .listen_os_shutdown_signals(false)
            .hooks(hooks.clone())
            .define_fn("Noop.run", |_ctx, _args| async {})
            .init()
            .await
            .expect("Failed to create worker");
        let utils = worker.create_utils().expect("Failed to create utils");

        utils.enqueue("low", "Noop.run", json!([])).await.unwrap();
        utils.enqueue("high", "Noop.run", json!([])).await.unwrap();

        worker.work().await.unwrap();
        worker.work().await.unwrap();

        assert_eq!(hooks.locked_queues(), vec!["high", "low"]);
        worker.connection().disconnect().await;
    })
    .await;
}

#[tokio::test]
async fn worker_stops_when_its_claim_is_taken_away() {
    with_test_db(|test_db| async move {
        let worker = WorkerOptions::default()
            .connector(test_db.connector())
            .heartbeat_interval(Duration::from_millis(50))
            .listen_os_shutdown_signals(false)
            .define_fn("Slow.run", |_ctx, _args| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
            })
            .init()
            .await
            .expect("Failed to create worker");
        let utils = worker.create_utils().expect("Failed to create utils");
        let job = utils.enqueue("default", "Slow.run", json!([])).await.unwrap();
        let worker = Arc::new(worker);

        let handle = tokio::spawn({
            let worker = worker.clone();
            async move { worker.run().await }
        });

        wait_until_async(Duration::from_secs(10), || {
            let pool = test_db.test_pool.clone();
            async move {
                query_scalar::<_, bool>(
                    "select heartbeat_by is not null from pgq_worker.jobs limit 1",
                )
                .fetch_optional(&pool)
                .await
                .unwrap()
                .unwrap_or(false)
            }
        })
        .await;
        sqlx::query("update pgq_worker.jobs set heartbeat_by = 'someone-else' where id = $1")
            .bind(job.id())
            .execute(&test_db.test_pool)
            .await
            .unwrap();

        let result = tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("worker should stop on its own")
            .unwrap();
        assert!(matches!(
            result,
            Err(pgq_worker::WorkerRuntimeError::LivenessLost { job_id, .. }) if job_id == *job.id()
        ));
        assert!(!worker.is_running());
        assert_eq!(utils.count(None).await.unwrap(), 1, "the job is left in place");
    })
    .await;
}

#[tokio::test]
async fn init_leaves_the_schema_alone_when_migrations_are_skipped() {
    with_test_db(|test_db| async move {
        WorkerOptions::default()
            .connector(test_db.connector())
            .schema("skipped_schema")
            .skip_migrations(true)
            .listen_os_shutdown_signals(false)
            .init()
            .await
            .expect("Failed to create worker");

        let missing: bool = query_scalar("select to_regclass('skipped_schema.jobs') is null")
            .fetch_one(&test_db.test_pool)
            .await
            .unwrap();
        assert!(missing, "no jobs table should have been created");

        WorkerOptions::default()
            .connector(test_db.connector())
            .schema("skipped_schema")
            .skip_migrations(false)
            .listen_os_shutdown_signals(false)
            .init()
            .await
            .expect("Failed to create worker");

        let missing: bool = query_scalar("select to_regclass('skipped_schema.jobs') is null")
            .fetch_one(&test_db.test_pool)
            .await
            .unwrap();
        assert!(!missing, "init should migrate by default");
    })
    .await;
}
