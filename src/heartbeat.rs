use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::queue::Queue;

/// Default period between two heartbeats of a running job.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);

/// Keeps the claim on a running job alive.
///
/// A background task refreshes the job's heartbeat every interval. When a
/// refresh reports the claim gone, the [`lost`](Heartbeat::lost) token is
/// cancelled and the task exits; transient errors are retried on the next
/// tick.
pub struct Heartbeat {
    heartbeat_id: String,
    job_id: i64,
    lost: CancellationToken,
    handle: JoinHandle<()>,
}

impl Heartbeat {
    pub fn start<Q: Queue>(queue: Arc<Q>, job_id: i64, interval: Duration) -> Self {
        let heartbeat_id = uuid::Uuid::new_v4().to_string();
        let lost = CancellationToken::new();
        debug!(at = "start_heartbeat", job_id, heartbeat_id);

        let handle = tokio::spawn(beat(
            queue,
            job_id,
            heartbeat_id.clone(),
            interval,
            lost.clone(),
        ));

        Heartbeat {
            heartbeat_id,
            job_id,
            lost,
            handle,
        }
    }

    pub fn heartbeat_id(&self) -> &str {
        &self.heartbeat_id
    }

    /// Cancelled once the claim on the job is known to be lost.
    pub fn lost(&self) -> CancellationToken {
        self.lost.clone()
    }

    pub fn is_lost(&self) -> bool {
        self.lost.is_cancelled()
    }

    /// Stops the background task and waits for it to finish.
    pub async fn stop(self) {
        self.handle.abort();
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                error!(
                    at = "stop_heartbeat",
                    job_id = self.job_id,
                    heartbeat_id = self.heartbeat_id,
                    error = %e,
                    "Heartbeat task panicked"
                );
            }
        }
        debug!(
            at = "stop_heartbeat",
            job_id = self.job_id,
            heartbeat_id = self.heartbeat_id
        );
    }
}

async fn beat<Q: Queue>(
    queue: Arc<Q>,
    job_id: i64,
    heartbeat_id: String,
    interval: Duration,
    lost: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match queue.heartbeat(&heartbeat_id, job_id).await {
            Ok(true) => {}
            Ok(false) => {
                error!(
                    at = "heartbeat_failed",
                    job_id, heartbeat_id, "Claim on job was lost"
                );
                lost.cancel();
                return;
            }
            Err(e) => {
                warn!(
                    at = "heartbeat",
                    job_id,
                    heartbeat_id,
                    error = %e,
                    "Could not refresh heartbeat, retrying on next tick"
                );
            }
        }
    }
}
