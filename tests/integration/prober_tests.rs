//! Integration tests for the readiness handshake.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nbcollect::channel::{MessageChannel, CHANNEL_CAPACITY};
use nbcollect::orchestrator::correlator::Correlator;
use nbcollect::orchestrator::prober::{probe_until_ready, wait_for_start, ProbePolicy};
use nbcollect::AppError;

use super::test_helpers::{spawn_scripted_kernel, Script};

fn policy(max_attempts: Option<u32>) -> ProbePolicy {
    ProbePolicy {
        start_poll_interval: Duration::from_millis(5),
        startup_timeout: Some(Duration::from_millis(200)),
        retry_interval: Duration::from_millis(20),
        max_attempts,
    }
}

// ── Start detection ─────────────────────────────────────────────────────────

/// The wait ends once the started flag flips.
#[tokio::test]
async fn wait_for_start_sees_flag() {
    let started = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&started);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        flag.store(true, Ordering::Release);
    });

    wait_for_start(&started, &policy(None))
        .await
        .expect("flag is set before the startup timeout");
}

/// A kernel that never prints trips the startup timeout.
#[tokio::test]
async fn wait_for_start_times_out() {
    let started = AtomicBool::new(false);
    let result = wait_for_start(&started, &policy(None)).await;
    assert!(matches!(result, Err(AppError::Timeout(_))), "got: {result:?}");
}

// ── Probing ─────────────────────────────────────────────────────────────────

/// Unanswered probes are retried with fresh ids until one is answered.
#[tokio::test]
async fn probes_until_answered() {
    let (channel, endpoint) = MessageChannel::in_memory(CHANNEL_CAPACITY);
    let kernel = spawn_scripted_kernel(
        endpoint,
        Script {
            ignore_probes: 2,
            ..Script::default()
        },
    );
    let mut correlator = Correlator::new(channel.inbound);

    let info = probe_until_ready(&channel.outbound, &mut correlator, "s", &policy(None))
        .await
        .expect("third probe is answered");

    assert_eq!(info["implementation"], "scripted");
    assert_eq!(info["language_info"]["name"], "python");
    assert_eq!(correlator.store().len(), 1, "only the answered probe has messages");

    drop(channel.outbound);
    let log = kernel.await.expect("kernel task");
    assert_eq!(log.probes, 3);
}

/// A silent kernel exhausts the configured attempts.
#[tokio::test]
async fn attempt_limit_is_a_timeout() {
    let (channel, endpoint) = MessageChannel::in_memory(CHANNEL_CAPACITY);
    let kernel = spawn_scripted_kernel(
        endpoint,
        Script {
            ignore_all_probes: true,
            ..Script::default()
        },
    );
    let mut correlator = Correlator::new(channel.inbound);

    let result =
        probe_until_ready(&channel.outbound, &mut correlator, "s", &policy(Some(3))).await;
    assert!(matches!(result, Err(AppError::Timeout(_))), "got: {result:?}");

    drop(channel.outbound);
    let log = kernel.await.expect("kernel task");
    assert_eq!(log.probes, 3);
}

/// A closed channel ends probing with a channel error.
#[tokio::test]
async fn closed_channel_is_an_error() {
    let (channel, endpoint) = MessageChannel::in_memory(CHANNEL_CAPACITY);
    drop(endpoint);
    let mut correlator = Correlator::new(channel.inbound);

    let result = probe_until_ready(&channel.outbound, &mut correlator, "s", &policy(None)).await;
    assert!(matches!(result, Err(AppError::Channel(_))), "got: {result:?}");
}
