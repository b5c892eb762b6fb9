//! Kernel connection descriptors.
//!
//! Before launch the supervisor reserves five loopback ports and writes them,
//! with a random signing key, to a JSON file the kernel reads via its argv.
//! The file is transient: [`KernelProcess::cleanup`](crate::kernel::supervisor::KernelProcess::cleanup)
//! deletes it.

use std::io::Write;
use std::net::{Ipv4Addr, TcpListener};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppError, Result};

/// Connection parameters shared with a kernel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Transport name.
    pub transport: String,
    /// Address the kernel binds.
    pub ip: String,
    /// Request/reply endpoint.
    pub shell_port: u16,
    /// Broadcast endpoint.
    pub iopub_port: u16,
    /// Input request endpoint.
    pub stdin_port: u16,
    /// Control endpoint.
    pub control_port: u16,
    /// Heartbeat endpoint.
    pub hb_port: u16,
    /// Message signing key.
    pub key: String,
    /// Message signing scheme.
    pub signature_scheme: String,
    /// Name of the kernel the descriptor was written for.
    pub kernel_name: String,
}

impl ConnectionInfo {
    /// Reserve free loopback ports and generate a signing key.
    ///
    /// The ports are released before the kernel starts, so another process
    /// could grab one in between; kernels report a bind failure on stderr.
    ///
    /// # Errors
    ///
    /// Returns `AppError::LaunchFailed` if no free port can be bound.
    pub fn allocate(kernel_name: &str) -> Result<Self> {
        let listeners = (0..5)
            .map(|_| TcpListener::bind((Ipv4Addr::LOCALHOST, 0)))
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|err| AppError::LaunchFailed(format!("cannot reserve kernel ports: {err}")))?;

        let ports = listeners
            .iter()
            .map(|l| l.local_addr().map(|addr| addr.port()))
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|err| AppError::LaunchFailed(format!("cannot read reserved port: {err}")))?;

        Ok(Self {
            transport: "tcp".to_owned(),
            ip: Ipv4Addr::LOCALHOST.to_string(),
            shell_port: ports[0],
            iopub_port: ports[1],
            stdin_port: ports[2],
            control_port: ports[3],
            hb_port: ports[4],
            key: Uuid::new_v4().to_string(),
            signature_scheme: "hmac-sha256".to_owned(),
            kernel_name: kernel_name.to_owned(),
        })
    }

    /// `ip:port` of the shell endpoint.
    #[must_use]
    pub fn shell_address(&self) -> String {
        format!("{}:{}", self.ip, self.shell_port)
    }

    /// Write the descriptor to a new `kernel-*.json` file in `dir`.
    ///
    /// The file outlives the returned path; the caller owns its deletion.
    ///
    /// # Errors
    ///
    /// Returns `AppError::LaunchFailed` if the file cannot be created or written.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let mut file = tempfile::Builder::new()
            .prefix("kernel-")
            .suffix(".json")
            .tempfile_in(dir)
            .map_err(|err| {
                AppError::LaunchFailed(format!(
                    "cannot create connection file in {}: {err}",
                    dir.display()
                ))
            })?;

        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|err| AppError::LaunchFailed(format!("cannot encode connection file: {err}")))?;
        file.write_all(&bytes)
            .and_then(|()| file.flush())
            .map_err(|err| AppError::LaunchFailed(format!("cannot write connection file: {err}")))?;

        let (_, path) = file
            .keep()
            .map_err(|err| AppError::LaunchFailed(format!("cannot persist connection file: {err}")))?;
        Ok(path)
    }
}
