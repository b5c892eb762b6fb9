//! Kernel process supervision.
//!
//! [`launch_kernel`] starts a kernel with:
//! - stdin closed and stdout/stderr piped, each drained by its own task that
//!   forwards chunks to a [`DiagnosticSink`] and flips the shared "has
//!   started" flag on the first chunk;
//! - an exit monitor task that owns the [`Child`] and publishes its exit status;
//! - `kill_on_drop(true)` so an abandoned handle never leaks a process.
//!
//! [`KernelProcess::cleanup`] is the single teardown path. It kills the kernel
//! if it is still alive and deletes the connection file, swallowing failures,
//! and it is safe to call any number of times.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio_util::codec::{BytesCodec, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::diagnostics::{DiagnosticSink, OutputStream};
use crate::kernel::catalog::{KernelSpecification, CONNECTION_FILE_PLACEHOLDER};
use crate::kernel::connection::ConnectionInfo;
use crate::{AppError, Result};

/// Options for starting a kernel.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Working directory of the kernel process.
    pub working_directory: PathBuf,
    /// Directory receiving the connection file.
    pub runtime_dir: PathBuf,
    /// How long cleanup waits for a killed kernel to be reaped.
    pub kill_grace: Duration,
}

/// How a kernel process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelExit {
    /// Exit code; `None` when terminated by a signal or when the status is unknown.
    pub code: Option<i32>,
}

impl KernelExit {
    /// Whether the kernel exited with code 0.
    #[must_use]
    pub fn success(self) -> bool {
        self.code == Some(0)
    }

    /// Code to propagate as our own exit code; signals map to 1.
    #[must_use]
    pub fn exit_code(self) -> i32 {
        self.code.unwrap_or(1)
    }
}

/// A supervised kernel subprocess.
#[derive(Debug)]
pub struct KernelProcess {
    kernel_name: String,
    pid: Option<u32>,
    connection: ConnectionInfo,
    connection_file: PathBuf,
    started: Arc<AtomicBool>,
    exit_rx: watch::Receiver<Option<KernelExit>>,
    kill: CancellationToken,
    kill_grace: Duration,
    cleaned_up: bool,
}

/// Start `spec` as a supervised kernel process.
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns `AppError::LaunchFailed` if the connection file cannot be written,
/// the argv is empty, or the OS refuses to spawn the process. The connection
/// file is removed again on spawn failure.
pub fn launch_kernel(
    spec: &KernelSpecification,
    options: &LaunchOptions,
    sink: Arc<dyn DiagnosticSink>,
) -> Result<KernelProcess> {
    let connection = ConnectionInfo::allocate(&spec.name)?;
    let connection_file = connection.write_to(&options.runtime_dir)?;

    let mut child = match spawn_child(spec, options, &connection_file) {
        Ok(child) => child,
        Err(err) => {
            remove_connection_file(&connection_file);
            return Err(err);
        }
    };

    let pid = child.id();
    info!(
        kernel = %spec.name,
        pid = pid.unwrap_or(0),
        connection_file = %connection_file.display(),
        "kernel process spawned"
    );

    let started = Arc::new(AtomicBool::new(false));

    // Output tasks end on EOF, which the kernel's exit guarantees.
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(route_output(
            OutputStream::Stdout,
            stdout,
            Arc::clone(&started),
            Arc::clone(&sink),
        ));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(route_output(
            OutputStream::Stderr,
            stderr,
            Arc::clone(&started),
            sink,
        ));
    }

    let (exit_tx, exit_rx) = watch::channel(None);
    let kill = CancellationToken::new();
    monitor_exit(spec.name.clone(), child, exit_tx, kill.clone());

    Ok(KernelProcess {
        kernel_name: spec.name.clone(),
        pid,
        connection,
        connection_file,
        started,
        exit_rx,
        kill,
        kill_grace: options.kill_grace,
        cleaned_up: false,
    })
}

fn spawn_child(
    spec: &KernelSpecification,
    options: &LaunchOptions,
    connection_file: &Path,
) -> Result<Child> {
    let file_arg = connection_file.to_string_lossy();
    let mut argv = spec
        .spec
        .argv
        .iter()
        .map(|arg| arg.replace(CONNECTION_FILE_PLACEHOLDER, &file_arg));

    let program = argv
        .next()
        .ok_or_else(|| AppError::LaunchFailed(format!("kernel {} has an empty argv", spec.name)))?;

    let mut cmd = Command::new(&program);
    cmd.args(argv)
        .envs(&spec.spec.env)
        .current_dir(&options.working_directory)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    cmd.spawn().map_err(|err| {
        AppError::LaunchFailed(format!("failed to spawn kernel {} ({program}): {err}", spec.name))
    })
}

impl KernelProcess {
    /// Name of the kernel specification this process was launched from.
    #[must_use]
    pub fn kernel_name(&self) -> &str {
        &self.kernel_name
    }

    /// OS process id, if the process was still running at spawn time.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Connection parameters handed to the kernel.
    #[must_use]
    pub fn connection(&self) -> &ConnectionInfo {
        &self.connection
    }

    /// Path of the transient connection file.
    #[must_use]
    pub fn connection_file(&self) -> &Path {
        &self.connection_file
    }

    /// Shared flag set once the kernel has written anything to stdout or stderr.
    #[must_use]
    pub fn started_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.started)
    }

    /// Whether the kernel has produced any output yet.
    #[must_use]
    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Exit status, if the kernel has already exited.
    #[must_use]
    pub fn exit_status(&self) -> Option<KernelExit> {
        *self.exit_rx.borrow()
    }

    /// Wait for the kernel to exit.
    ///
    /// Cancel-safe; resolves immediately if the exit was already observed.
    pub async fn exited(&mut self) -> KernelExit {
        match self.exit_rx.wait_for(Option::is_some).await {
            Ok(exit) => (*exit).unwrap_or(KernelExit { code: None }),
            // The monitor always publishes before dropping its sender.
            Err(_) => KernelExit { code: None },
        }
    }

    /// Kill the kernel if alive and delete the connection file.
    ///
    /// Idempotent and best-effort: failures are logged, never returned.
    pub async fn cleanup(&mut self) {
        if self.cleaned_up {
            debug!(kernel = %self.kernel_name, "cleanup already done");
            return;
        }
        self.cleaned_up = true;

        if self.exit_status().is_none() {
            self.kill.cancel();
            let grace = self.kill_grace;
            if tokio::time::timeout(grace, self.exited()).await.is_err() {
                warn!(kernel = %self.kernel_name, ?grace, "kernel not reaped within grace period");
            }
        }

        match tokio::fs::remove_file(&self.connection_file).await {
            Ok(()) => debug!(path = %self.connection_file.display(), "connection file removed"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %self.connection_file.display(), %err, "failed to remove connection file");
            }
        }

        info!(kernel = %self.kernel_name, "kernel cleaned up");
    }
}

impl Drop for KernelProcess {
    fn drop(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.kill.cancel();
        remove_connection_file(&self.connection_file);
    }
}

fn remove_connection_file(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), %err, "failed to remove connection file");
        }
    }
}

/// Forward every chunk of `reader` to `sink`, marking the kernel as started.
async fn route_output<R>(
    stream: OutputStream,
    reader: R,
    started: Arc<AtomicBool>,
    sink: Arc<dyn DiagnosticSink>,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(reader, BytesCodec::new());

    while let Some(chunk) = framed.next().await {
        match chunk {
            Ok(bytes) => {
                if !started.swap(true, Ordering::AcqRel) {
                    debug!(stream = stream.as_str(), "first kernel output received");
                }
                sink.emit(stream, &bytes);
            }
            Err(err) => {
                warn!(stream = stream.as_str(), %err, "kernel output read failed, stopping");
                break;
            }
        }
    }

    debug!(stream = stream.as_str(), "kernel output closed");
}

/// Own `child` until it exits or `kill` fires, then publish how it ended.
fn monitor_exit(
    kernel: String,
    mut child: Child,
    exit_tx: watch::Sender<Option<KernelExit>>,
    kill: CancellationToken,
) {
    tokio::spawn(async move {
        let status = tokio::select! {
            result = child.wait() => result,
            () = kill.cancelled() => {
                debug!(%kernel, "killing kernel process");
                if let Err(err) = child.start_kill() {
                    debug!(%kernel, %err, "kill failed; process likely already gone");
                }
                child.wait().await
            }
        };

        let exit = match status {
            Ok(status) => KernelExit { code: status.code() },
            Err(err) => {
                warn!(%kernel, %err, "error waiting for kernel process");
                KernelExit { code: None }
            }
        };

        info!(%kernel, code = ?exit.code, "kernel process exited");
        exit_tx.send_replace(Some(exit));
    });
}
