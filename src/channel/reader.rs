//! Inbound reader task.
//!
//! Reads newline-delimited JSON from the kernel side of a transport, decodes
//! each line into an [`InboundMessage`], and forwards it through an [`mpsc`]
//! channel in arrival order. Malformed lines are logged and skipped; they never
//! end the task. EOF or an I/O error ends the task, which drops the sender and
//! lets the correlator see the stream close.
//!
//! Lines are framed with [`LinesCodec`] capped at [`MAX_LINE_BYTES`]; an
//! over-long line is discarded up to its newline and reading resumes.

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::message::InboundMessage;
use crate::{AppError, Result};

/// Maximum inbound line length: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Decode one NDJSON line.
///
/// Returns `Ok(None)` for blank lines.
///
/// # Errors
///
/// Returns [`AppError::Channel`]`("malformed message: …")` if the line is not a
/// JSON message with at least a `header.msg_type`.
pub fn parse_inbound_line(line: &str) -> Result<Option<InboundMessage>> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| AppError::Channel(format!("malformed message: {e}")))
}

/// Reader task: forward decoded messages from `stream` to `inbound_tx`.
///
/// Exits on EOF, on an unrecoverable I/O error, when `cancel` fires, or when
/// the receiving side is dropped.
///
/// # Errors
///
/// Always returns `Ok(())`; failures are logged.
pub async fn run_reader<R>(
    stream: R,
    inbound_tx: mpsc::Sender<InboundMessage>,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stream, LinesCodec::new_with_max_length(MAX_LINE_BYTES));

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("channel reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!("channel reader: EOF detected");
                        break;
                    }

                    Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                        warn!(limit = MAX_LINE_BYTES, "channel reader: line too long, skipping");
                    }

                    Some(Err(LinesCodecError::Io(e))) => {
                        warn!(error = %e, "channel reader: IO error, stopping");
                        break;
                    }

                    Some(Ok(line)) => match parse_inbound_line(&line) {
                        Ok(Some(message)) => {
                            if inbound_tx.send(message).await.is_err() {
                                debug!("channel reader: receiver dropped, stopping");
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(error = %e, raw_line = %line, "channel reader: parse error, skipping line");
                        }
                    },
                }
            }
        }
    }

    Ok(())
}
