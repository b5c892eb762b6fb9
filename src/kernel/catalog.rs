//! Kernel specifications and on-disk discovery.
//!
//! A kernel specification lives in `<dir>/<name>/kernel.json`. The catalog is
//! a name-sorted map so "first entry matching a language" is deterministic.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::{AppError, Result};

/// Placeholder in `argv` replaced with the connection file path at launch.
pub const CONNECTION_FILE_PLACEHOLDER: &str = "{connection_file}";

/// Contents of a `kernel.json` launch descriptor.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LaunchDescriptor {
    /// Command template; may contain [`CONNECTION_FILE_PLACEHOLDER`].
    pub argv: Vec<String>,
    /// Human-readable kernel name.
    #[serde(default)]
    pub display_name: String,
    /// Language the kernel executes.
    #[serde(default)]
    pub language: String,
    /// Extra environment for the kernel process.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// An installed kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSpecification {
    /// Kernel identifier (its directory name).
    pub name: String,
    /// Directory holding `kernel.json` and any resources.
    pub resource_dir: PathBuf,
    /// Launch descriptor.
    pub spec: LaunchDescriptor,
}

impl KernelSpecification {
    /// Declared language of the kernel.
    #[must_use]
    pub fn language(&self) -> &str {
        &self.spec.language
    }
}

/// Kernel catalog keyed by kernel name.
pub type KernelCatalog = BTreeMap<String, KernelSpecification>;

/// Source of installed kernel specifications.
pub trait KernelDiscovery {
    /// Return every kernel the source knows about.
    ///
    /// # Errors
    ///
    /// Implementations return `AppError::Io` on unrecoverable read failures.
    fn find_all(&self) -> Result<KernelCatalog>;
}

/// Discovers kernels by scanning directories for `<name>/kernel.json`.
///
/// Directories earlier in the list shadow later ones, so user-installed
/// kernels win over system-wide ones with the same name.
#[derive(Debug, Clone)]
pub struct DirectoryDiscovery {
    dirs: Vec<PathBuf>,
}

impl DirectoryDiscovery {
    /// Discover kernels in `dirs`, highest priority first.
    #[must_use]
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }
}

impl KernelDiscovery for DirectoryDiscovery {
    fn find_all(&self) -> Result<KernelCatalog> {
        let mut catalog = KernelCatalog::new();

        for dir in &self.dirs {
            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => {
                    warn!(dir = %dir.display(), %err, "cannot read kernel directory, skipping");
                    continue;
                }
            };

            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        warn!(dir = %dir.display(), %err, "unreadable kernel directory entry, skipping");
                        continue;
                    }
                };
                let resource_dir = entry.path();
                let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                    continue;
                };
                if catalog.contains_key(&name) {
                    debug!(%name, dir = %dir.display(), "kernel shadowed by earlier directory");
                    continue;
                }

                match load_spec(&resource_dir) {
                    Ok(Some(spec)) => {
                        catalog.insert(
                            name.clone(),
                            KernelSpecification {
                                name,
                                resource_dir,
                                spec,
                            },
                        );
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(%name, %err, "invalid kernel specification, skipping");
                    }
                }
            }
        }

        Ok(catalog)
    }
}

fn load_spec(resource_dir: &Path) -> Result<Option<LaunchDescriptor>> {
    let path = resource_dir.join("kernel.json");
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    let spec: LaunchDescriptor = serde_json::from_str(&raw)
        .map_err(|err| AppError::Config(format!("{}: {err}", path.display())))?;

    if spec.argv.is_empty() {
        return Err(AppError::Config(format!("{}: empty argv", path.display())));
    }

    Ok(Some(spec))
}

/// The standard Jupyter kernel search path, highest priority first.
#[must_use]
pub fn default_kernel_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Some(paths) = std::env::var_os("JUPYTER_PATH") {
        dirs.extend(std::env::split_paths(&paths).map(|p| p.join("kernels")));
    }
    if let Some(data) = dirs::data_dir() {
        dirs.push(data.join("jupyter").join("kernels"));
    }
    dirs.push(PathBuf::from("/usr/local/share/jupyter/kernels"));
    dirs.push(PathBuf::from("/usr/share/jupyter/kernels"));

    dirs
}
