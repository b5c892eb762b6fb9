//! Outbound writer task.
//!
//! Receives [`OutboundMessage`]s from an [`mpsc`] channel, serialises each one
//! to a single JSON line and writes it to the transport, flushing after every
//! message so requests are never held back in a buffer.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::models::message::OutboundMessage;
use crate::{AppError, Result};

/// Writer task: serialise messages from `outbound_rx` onto `sink` as NDJSON.
///
/// Exits cleanly when `cancel` fires or every sender is dropped.
///
/// # Errors
///
/// - [`AppError::Channel`]`("failed to serialise outbound message: …")`.
/// - [`AppError::Channel`]`("write failed: …")` if the transport is gone.
pub async fn run_writer<W>(
    sink: W,
    mut outbound_rx: mpsc::Receiver<OutboundMessage>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut sink = sink;

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("channel writer: cancellation received, stopping");
                break;
            }

            msg = outbound_rx.recv() => {
                let Some(message) = msg else {
                    debug!("channel writer: message channel closed, stopping");
                    break;
                };

                let mut bytes = serde_json::to_vec(&message).map_err(|e| {
                    AppError::Channel(format!("failed to serialise outbound message: {e}"))
                })?;
                bytes.push(b'\n');

                sink.write_all(&bytes).await.map_err(|e| {
                    warn!(error = %e, "channel writer: write failed");
                    AppError::Channel(format!("write failed: {e}"))
                })?;
                sink.flush()
                    .await
                    .map_err(|e| AppError::Channel(format!("flush failed: {e}")))?;

                trace!(msg_id = message.id(), msg_type = message.msg_type(), "channel writer: sent");
            }
        }
    }

    Ok(())
}
