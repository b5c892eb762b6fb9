//! Global configuration parsing and validation.
//!
//! Every field has a default, so running without a config file is the same as
//! loading an empty TOML document. Wait limits use `0` for "no limit", which
//! keeps the indefinite waits of a plain run unless an operator opts in.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Polling intervals, attempt limits and timeouts for a run.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct TimeoutConfig {
    /// Interval between checks of the kernel's "has produced output" flag.
    pub start_poll_ms: u64,
    /// Interval between readiness probes.
    pub probe_interval_ms: u64,
    /// Maximum readiness probes; 0 means unbounded.
    pub probe_max_attempts: u32,
    /// Maximum transport connect attempts; 0 means unbounded.
    pub connect_max_attempts: u32,
    /// Limit on waiting for the first kernel output; 0 means no timeout.
    pub startup_seconds: u64,
    /// Limit on waiting for a single cell to go idle; 0 means no timeout.
    pub cell_seconds: u64,
    /// Time spent collecting late messages after the last cell.
    pub drain_ms: u64,
    /// How long cleanup waits for a killed kernel to be reaped.
    pub kill_grace_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            start_poll_ms: 60,
            probe_interval_ms: 60,
            probe_max_attempts: 0,
            connect_max_attempts: 0,
            startup_seconds: 0,
            cell_seconds: 0,
            drain_ms: 0,
            kill_grace_ms: 2000,
        }
    }
}

impl TimeoutConfig {
    /// Interval between `has_started` checks.
    #[must_use]
    pub fn start_poll_interval(&self) -> Duration {
        Duration::from_millis(self.start_poll_ms)
    }

    /// Interval between readiness probes.
    #[must_use]
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    /// Probe attempt limit, if any.
    #[must_use]
    pub fn probe_max_attempts(&self) -> Option<u32> {
        non_zero(self.probe_max_attempts)
    }

    /// Connect attempt limit, if any.
    #[must_use]
    pub fn connect_max_attempts(&self) -> Option<u32> {
        non_zero(self.connect_max_attempts)
    }

    /// Startup wait limit, if any.
    #[must_use]
    pub fn startup_timeout(&self) -> Option<Duration> {
        non_zero(self.startup_seconds).map(Duration::from_secs)
    }

    /// Per-cell wait limit, if any.
    #[must_use]
    pub fn cell_timeout(&self) -> Option<Duration> {
        non_zero(self.cell_seconds).map(Duration::from_secs)
    }

    /// Drain delay before teardown, if any.
    #[must_use]
    pub fn drain_delay(&self) -> Option<Duration> {
        non_zero(self.drain_ms).map(Duration::from_millis)
    }

    /// Grace period for reaping a killed kernel.
    #[must_use]
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

fn non_zero<T: Default + PartialEq>(value: T) -> Option<T> {
    (value != T::default()).then_some(value)
}

fn default_kernel() -> String {
    "python3".into()
}

/// Global configuration parsed from an optional `nbcollect.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Kernel used when notebook metadata declares none.
    #[serde(default = "default_kernel")]
    pub default_kernel: String,
    /// Directories holding `<name>/kernel.json`; empty uses the Jupyter search path.
    #[serde(default)]
    pub kernel_dirs: Vec<PathBuf>,
    /// Working directory of the kernel subprocess.
    #[serde(default = "std::env::temp_dir")]
    pub working_directory: PathBuf,
    /// Directory receiving transient connection files.
    #[serde(default = "std::env::temp_dir")]
    pub runtime_dir: PathBuf,
    /// Polling and wait limits.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            default_kernel: default_kernel(),
            kernel_dirs: Vec::new(),
            working_directory: std::env::temp_dir(),
            runtime_dir: std::env::temp_dir(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Directories searched for kernel specifications.
    #[must_use]
    pub fn kernel_search_path(&self) -> Vec<PathBuf> {
        if self.kernel_dirs.is_empty() {
            crate::kernel::catalog::default_kernel_dirs()
        } else {
            self.kernel_dirs.clone()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.default_kernel.trim().is_empty() {
            return Err(AppError::Config("default_kernel must not be empty".into()));
        }

        if self.timeouts.start_poll_ms == 0 {
            return Err(AppError::Config(
                "timeouts.start_poll_ms must be greater than zero".into(),
            ));
        }

        if self.timeouts.probe_interval_ms == 0 {
            return Err(AppError::Config(
                "timeouts.probe_interval_ms must be greater than zero".into(),
            ));
        }

        if !self.working_directory.is_dir() {
            return Err(AppError::Config(format!(
                "working_directory {} is not a directory",
                self.working_directory.display()
            )));
        }

        if !self.runtime_dir.is_dir() {
            return Err(AppError::Config(format!(
                "runtime_dir {} is not a directory",
                self.runtime_dir.display()
            )));
        }

        Ok(())
    }
}
