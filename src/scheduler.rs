//! Cancellable periodic tasks.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Run `cycle` immediately, then again `interval` after each run finishes,
/// until `shutdown` is cancelled.
///
/// Cancellation is only observed between cycles; a cycle that has started
/// always runs to completion.
pub async fn run_periodic<F, Fut>(
    name: &str,
    interval: Duration,
    shutdown: CancellationToken,
    mut cycle: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    info!(task = name, interval_secs = interval.as_secs(), "Starting periodic task");

    let mut runs: u64 = 0;
    while !shutdown.is_cancelled() {
        cycle().await;
        runs += 1;

        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            () = shutdown.cancelled() => break,
        }
    }

    info!(task = name, runs, "Periodic task shutting down");
}
