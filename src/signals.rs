//! Process signal handling.
//!
//! Handlers are installed synchronously by [`watch_shutdown_signals`], so a
//! signal that arrives before the watcher task first runs is still caught
//! instead of killing the process with its default action.

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::Result;

/// Cancel `interrupt` on Ctrl-C, or on SIGINT/SIGTERM under unix.
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns `AppError::Io` if a handler cannot be installed.
pub fn watch_shutdown_signals(interrupt: CancellationToken) -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => info!("SIGINT received"),
                _ = sigterm.recv() => info!("SIGTERM received"),
            }
            interrupt.cancel();
        });
    }

    #[cfg(windows)]
    {
        let mut ctrl_c = tokio::signal::windows::ctrl_c()?;
        tokio::spawn(async move {
            if ctrl_c.recv().await.is_some() {
                info!("ctrl-c received");
                interrupt.cancel();
            }
        });
    }

    Ok(())
}
