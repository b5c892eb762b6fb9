//! Kernel message channels.
//!
//! The orchestrator only ever sees a [`MessageChannel`]: an outbound
//! [`mpsc::Sender`] for requests and an inbound [`mpsc::Receiver`] of already
//! decoded messages. How bytes reach the kernel is the business of a
//! [`KernelTransport`].
//!
//! Submodules:
//! - `reader`: task framing and decoding inbound lines into [`InboundMessage`]s.
//! - `writer`: task encoding [`OutboundMessage`]s as lines.
//! - `tcp`: line-delimited JSON over TCP to the kernel's shell endpoint.

pub mod reader;
pub mod tcp;
pub mod writer;

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::kernel::connection::ConnectionInfo;
use crate::models::message::{InboundMessage, OutboundMessage};
use crate::Result;

/// Default capacity of the inbound and outbound queues.
pub const CHANNEL_CAPACITY: usize = 256;

/// Opens message channels to a launched kernel.
pub trait KernelTransport: Send + Sync {
    /// Connect to the kernel described by `connection`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Channel`](crate::AppError::Channel) if the kernel
    /// cannot be reached.
    fn open<'a>(
        &'a self,
        connection: &'a ConnectionInfo,
    ) -> Pin<Box<dyn Future<Output = Result<MessageChannel>> + Send + 'a>>;
}

/// Bidirectional message stream to one kernel.
#[derive(Debug)]
pub struct MessageChannel {
    /// Requests to the kernel.
    pub outbound: mpsc::Sender<OutboundMessage>,
    /// Decoded kernel messages, in arrival order.
    pub inbound: mpsc::Receiver<InboundMessage>,
    /// Owner of the background tasks serving this channel.
    pub handle: ChannelHandle,
}

/// The kernel-facing half of an in-memory channel.
#[derive(Debug)]
pub struct KernelEndpoint {
    /// Requests sent by the orchestrator.
    pub requests: mpsc::Receiver<OutboundMessage>,
    /// Replies and broadcasts delivered to the orchestrator.
    pub replies: mpsc::Sender<InboundMessage>,
}

impl MessageChannel {
    /// Serve a channel over a byte stream pair using NDJSON framing.
    ///
    /// Spawns one reader and one writer task; both stop when the returned
    /// channel's handle is closed or dropped.
    #[must_use]
    pub fn from_io<R, W>(reader: R, writer: W, capacity: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);

        let reader_cancel = cancel.clone();
        let reader_task = tokio::spawn(async move {
            if let Err(err) = reader::run_reader(reader, inbound_tx, reader_cancel).await {
                warn!(%err, "channel reader failed");
            }
        });

        let writer_cancel = cancel.clone();
        let writer_task = tokio::spawn(async move {
            if let Err(err) = writer::run_writer(writer, outbound_rx, writer_cancel).await {
                warn!(%err, "channel writer failed");
            }
        });

        Self {
            outbound: outbound_tx,
            inbound: inbound_rx,
            handle: ChannelHandle {
                cancel,
                tasks: vec![reader_task, writer_task],
            },
        }
    }

    /// Create a channel whose other end is handed back as a [`KernelEndpoint`].
    ///
    /// Used to drive in-process kernels without any transport.
    #[must_use]
    pub fn in_memory(capacity: usize) -> (Self, KernelEndpoint) {
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);

        let channel = Self {
            outbound: outbound_tx,
            inbound: inbound_rx,
            handle: ChannelHandle {
                cancel: CancellationToken::new(),
                tasks: Vec::new(),
            },
        };
        let endpoint = KernelEndpoint {
            requests: outbound_rx,
            replies: inbound_tx,
        };

        (channel, endpoint)
    }
}

/// Stops a channel's background tasks when closed or dropped.
#[derive(Debug)]
pub struct ChannelHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ChannelHandle {
    /// Stop the channel and wait for its tasks to finish.
    pub async fn close(mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(err) = task.await {
                warn!(%err, "channel task panicked");
            }
        }
        debug!("message channel closed");
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
