//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Exit code reported when a run is interrupted by the operator.
pub const INTERRUPTED_EXIT_CODE: i32 = 1;

/// Exit code reported for every other fatal error.
pub const FAILURE_EXIT_CODE: i32 = 1;

/// Application error enumeration covering all domain failure modes.
///
/// A cell that fails inside the kernel is not an error at this level: the
/// sequencer reports it as [`SequenceOutcome::HaltedOnError`](crate::orchestrator::sequencer::SequenceOutcome::HaltedOnError)
/// and the run still terminates normally.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Notebook could not be read or parsed.
    Document(String),
    /// No catalog entry matched the declared kernel name or language.
    KernelNotFound(String),
    /// The kernel subprocess could not be started.
    LaunchFailed(String),
    /// The kernel subprocess exited before every cell was processed.
    EarlyExit {
        /// Exit code to propagate (0 for a clean early stop).
        code: i32,
    },
    /// The run was interrupted by a signal.
    Interrupted,
    /// Message channel failure (connect, framing, or closed stream).
    Channel(String),
    /// A configured wait limit elapsed.
    Timeout(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Process exit code that mirrors this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::EarlyExit { code } => *code,
            Self::Interrupted => INTERRUPTED_EXIT_CODE,
            _ => FAILURE_EXIT_CODE,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Document(msg) => write!(f, "document: {msg}"),
            Self::KernelNotFound(msg) => write!(f, "kernel not found: {msg}"),
            Self::LaunchFailed(msg) => write!(f, "launch failed: {msg}"),
            Self::EarlyExit { code } => write!(f, "kernel exited early with code {code}"),
            Self::Interrupted => write!(f, "interrupted"),
            Self::Channel(msg) => write!(f, "channel: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
