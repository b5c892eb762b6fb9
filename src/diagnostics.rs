//! Live routing of kernel stdout/stderr.
//!
//! Kernel output that never travels over the message channel (startup
//! banners, tracebacks from a crashing interpreter) is forwarded chunk by chunk
//! to a [`DiagnosticSink`], tagged with the stream it came from.

use tracing::{info, warn};

/// Kernel output stream a chunk was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    /// Kernel standard output.
    Stdout,
    /// Kernel standard error.
    Stderr,
}

impl OutputStream {
    /// Stream name used in log fields.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Receives raw kernel output as it arrives.
pub trait DiagnosticSink: Send + Sync {
    /// Handle one chunk read from `stream`.
    fn emit(&self, stream: OutputStream, chunk: &[u8]);
}

/// Sink that logs every chunk through `tracing` under the `kernel` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, stream: OutputStream, chunk: &[u8]) {
        let text = String::from_utf8_lossy(chunk);
        let text = text.trim_end();
        match stream {
            OutputStream::Stdout => info!(target: "kernel", stream = stream.as_str(), "{text}"),
            OutputStream::Stderr => warn!(target: "kernel", stream = stream.as_str(), "{text}"),
        }
    }
}
