//! Kernel readiness handshake.
//!
//! A kernel process can be alive long before it answers on its message
//! channel. Readiness is established in two steps:
//!
//! 1. **`wait_for_start`**: poll the supervisor's "has produced output" flag.
//! 2. **`probe_until_ready`**: send `kernel_info_request` probes, each with a
//!    fresh id, until a `kernel_info_reply` to any of them comes back.
//!
//! Both loops run forever unless the [`ProbePolicy`] sets a limit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::TimeoutConfig;
use crate::models::message::{msg_type, OutboundMessage};
use crate::orchestrator::correlator::Correlator;
use crate::{AppError, Result};

/// Intervals and limits for the readiness handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePolicy {
    /// Interval between checks of the started flag.
    pub start_poll_interval: Duration,
    /// Limit on waiting for the started flag.
    pub startup_timeout: Option<Duration>,
    /// Wait for a reply before sending the next probe.
    pub retry_interval: Duration,
    /// Limit on the number of probes.
    pub max_attempts: Option<u32>,
}

impl From<&TimeoutConfig> for ProbePolicy {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            start_poll_interval: config.start_poll_interval(),
            startup_timeout: config.startup_timeout(),
            retry_interval: config.probe_interval(),
            max_attempts: config.probe_max_attempts(),
        }
    }
}

/// Wait until `started` is set.
///
/// # Errors
///
/// Returns `AppError::Timeout` if `policy.startup_timeout` elapses first.
pub async fn wait_for_start(started: &AtomicBool, policy: &ProbePolicy) -> Result<()> {
    let deadline = policy
        .startup_timeout
        .map(|limit| tokio::time::Instant::now() + limit);

    while !started.load(Ordering::Acquire) {
        if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
            return Err(AppError::Timeout(format!(
                "kernel produced no output within {:?}",
                policy.startup_timeout.unwrap_or_default()
            )));
        }
        tokio::time::sleep(policy.start_poll_interval).await;
    }

    debug!("kernel has started producing output");
    Ok(())
}

/// Probe the kernel until it answers a `kernel_info_request`.
///
/// A reply to any earlier probe counts, so a slow kernel answering the first
/// probe after the third was sent still ends the loop.
///
/// # Returns
///
/// The `content` of the first `kernel_info_reply`.
///
/// # Errors
///
/// - `AppError::Timeout` if `policy.max_attempts` probes go unanswered.
/// - `AppError::Channel` if the channel closes.
pub async fn probe_until_ready(
    outbound: &mpsc::Sender<OutboundMessage>,
    correlator: &mut Correlator,
    session: &str,
    policy: &ProbePolicy,
) -> Result<Value> {
    let mut sent: Vec<String> = Vec::new();

    loop {
        if let Some(max) = policy.max_attempts {
            if sent.len() >= max as usize {
                return Err(AppError::Timeout(format!(
                    "kernel did not answer {max} readiness probes"
                )));
            }
        }

        let probe = OutboundMessage::kernel_info_request(session);
        sent.push(probe.id().to_owned());
        outbound
            .send(probe)
            .await
            .map_err(|_| AppError::Channel("outbound channel closed during handshake".into()))?;

        let reply = correlator.await_where(|m| {
            m.has_type(msg_type::KERNEL_INFO_REPLY)
                && m.parent_id().is_some_and(|parent| sent.iter().any(|id| id == parent))
        });

        match tokio::time::timeout(policy.retry_interval, reply).await {
            Ok(Ok(reply)) => {
                let implementation = reply.content.get("implementation").and_then(Value::as_str);
                let language = reply
                    .content
                    .pointer("/language_info/name")
                    .and_then(Value::as_str);
                info!(attempts = sent.len(), implementation, language, "kernel is ready");
                return Ok(reply.content);
            }
            Ok(Err(err)) => return Err(err),
            Err(_elapsed) => {
                debug!(attempt = sent.len(), "no kernel_info_reply yet, probing again");
            }
        }
    }
}
