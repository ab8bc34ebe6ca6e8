use std::future::Future;
use std::pin::Pin;

use cfg_if::cfg_if;
use futures::{future::Shared, FutureExt};
use tokio::select;
use tokio::task::JoinHandle;
use tracing::{info, warn};

cfg_if! {
    if #[cfg(windows)] {
        use tokio::signal::windows::*;

        async fn raw_shutdown_signal() {
            let (Ok(mut ctrl_c), Ok(mut ctrl_close), Ok(mut ctrl_shutdown)) =
                (ctrl_c(), ctrl_close(), ctrl_shutdown())
            else {
                warn!("Could not attach windows console handlers, shutdown signals are ignored");
                return futures::future::pending().await;
            };
            select! {
                _ = ctrl_c.recv() => (),
                _ = ctrl_close.recv() => (),
                _ = ctrl_shutdown.recv() => (),
            }
        }
    } else if #[cfg(unix)] {
        use tokio::signal::unix::*;

        async fn unix_shutdown_signal(signal_kind: SignalKind) {
            match signal(signal_kind) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, signal = signal_kind.as_raw_value(), "Could not listen to unix signal");
                    futures::future::pending::<()>().await;
                }
            }
        }

        async fn raw_shutdown_signal() {
            select! {
                _ = unix_shutdown_signal(SignalKind::interrupt()) => (),
                _ = unix_shutdown_signal(SignalKind::terminate()) => (),
                _ = unix_shutdown_signal(SignalKind::hangup()) => (),
                _ = unix_shutdown_signal(SignalKind::quit()) => (),
            };
        }
    } else {
        compile_error!("Your OS does not support shutdown signal ! Are you targeting wasm ?");
    }
}

/// A cloneable future resolving once the process has been asked to stop.
pub type ShutdownSignal = Shared<Pin<Box<dyn Future<Output = ()> + Send>>>;

pub fn shutdown_signal() -> ShutdownSignal {
    async {
        raw_shutdown_signal().await;
        info!("Shutdown signal detected. Worker will stop after the current job...");
    }
    .boxed()
    .shared()
}

/// Runs `on_shutdown` once `signal` resolves.
///
/// The returned handle can be aborted when the caller stops for another
/// reason and no longer cares about the signal.
pub fn on_shutdown<F>(signal: ShutdownSignal, on_shutdown: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    tokio::spawn(async move {
        signal.await;
        on_shutdown();
    })
}
