//! Integration tests for shutdown signal handling.

#![cfg(unix)]

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use nbcollect::signals::watch_shutdown_signals;

/// A signal delivered before the watcher task has ever run still cancels the
/// token instead of terminating the process.
#[tokio::test]
async fn signal_before_watcher_runs_is_caught() {
    let interrupt = CancellationToken::new();
    watch_shutdown_signals(interrupt.clone()).expect("handlers must install");

    let status = std::process::Command::new("kill")
        .args(["-TERM", &std::process::id().to_string()])
        .status()
        .expect("run kill");
    assert!(status.success());

    tokio::time::timeout(Duration::from_secs(5), interrupt.cancelled())
        .await
        .expect("token must be cancelled");
}
