//! Line-delimited JSON over TCP.
//!
//! Connects to the shell endpoint named in the connection file and exchanges
//! one JSON message per line in both directions. Kernels only speaking native
//! ZeroMQ framing need a bridge listening on that port.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::channel::{KernelTransport, MessageChannel, CHANNEL_CAPACITY};
use crate::kernel::connection::ConnectionInfo;
use crate::{AppError, Result};

/// Transport connecting to `ip:shell_port` with retries.
///
/// A freshly launched kernel may not be listening yet, so refused connections
/// are retried every `retry_interval`, up to `max_attempts` if set.
#[derive(Debug, Clone)]
pub struct TcpLineTransport {
    retry_interval: Duration,
    max_attempts: Option<u32>,
}

impl TcpLineTransport {
    /// Create a transport retrying every `retry_interval`, optionally bounded.
    #[must_use]
    pub fn new(retry_interval: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            retry_interval,
            max_attempts,
        }
    }

    async fn connect(&self, address: &str) -> Result<TcpStream> {
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);
            match TcpStream::connect(address).await {
                Ok(stream) => {
                    info!(address, attempt, "connected to kernel");
                    return Ok(stream);
                }
                Err(err) => {
                    if self.max_attempts.is_some_and(|max| attempt >= max) {
                        return Err(AppError::Channel(format!(
                            "cannot connect to kernel at {address} after {attempt} attempts: {err}"
                        )));
                    }
                    debug!(address, attempt, %err, "kernel not accepting connections yet");
                    tokio::time::sleep(self.retry_interval).await;
                }
            }
        }
    }
}

impl KernelTransport for TcpLineTransport {
    fn open<'a>(
        &'a self,
        connection: &'a ConnectionInfo,
    ) -> Pin<Box<dyn Future<Output = Result<MessageChannel>> + Send + 'a>> {
        Box::pin(async move {
            let stream = self.connect(&connection.shell_address()).await?;
            let (read_half, write_half) = stream.into_split();
            Ok(MessageChannel::from_io(read_half, write_half, CHANNEL_CAPACITY))
        })
    }
}
