//! Graceful shutdown (§4.11).
//!
//! Generalizes the teacher's `ctrl_c`-only shutdown future to also listen for
//! `SIGTERM` (the signal container orchestrators send), and arms a watchdog
//! that force-exits the process if draining in-flight requests takes longer
//! than the configured grace period. A second shutdown signal is not handled:
//! the signal future is consumed the first time it resolves.

use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

/// Future to hand to `axum::serve(..).with_graceful_shutdown(..)`.
///
/// Resolves on the first `SIGINT` or `SIGTERM`. Once it resolves it arms a
/// watchdog that force-exits the process (`std::process::exit(1)`) if the
/// server is still draining connections after `grace`.
pub async fn signal(grace: Duration) {
    let mut sigterm =
        signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT, draining in-flight requests"),
        _ = sigterm.recv() => info!("received SIGTERM, draining in-flight requests"),
    }

    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        warn!(grace_secs = grace.as_secs(), "graceful shutdown deadline exceeded, forcing exit");
        std::process::exit(1);
    });
}

/// Abort a set of background task handles and report whether any had already
/// exited with an error. Called after the HTTP server finishes draining, so
/// worker/listener/schedule/retention loops don't outlive the process.
pub fn abort_background_tasks(handles: &[tokio::task::JoinHandle<()>]) {
    for handle in handles {
        handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn abort_background_tasks_stops_running_loops() {
        let handle = tokio::spawn(async {
            loop {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        });

        abort_background_tasks(std::slice::from_ref(&handle));

        let result = handle.await;
        assert!(result.unwrap_err().is_cancelled());
    }
}
