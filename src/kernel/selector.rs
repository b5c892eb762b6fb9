//! Kernel selection from notebook metadata.

use tracing::{debug, info};

use crate::kernel::catalog::{KernelCatalog, KernelSpecification};
use crate::models::notebook::NotebookMetadata;
use crate::{AppError, Result};

/// Name the notebook asks for, or `fallback` when its metadata names nothing.
#[must_use]
pub fn declared_kernel_name<'a>(metadata: &'a NotebookMetadata, fallback: &'a str) -> &'a str {
    metadata.declared_kernel_name().unwrap_or(fallback)
}

/// Resolve `declared` against `catalog`.
///
/// Exact name match first, then the first kernel (in name order) whose
/// language equals `declared`.
///
/// # Errors
///
/// Returns `AppError::KernelNotFound` if neither lookup matches.
pub fn select_kernel<'a>(
    catalog: &'a KernelCatalog,
    declared: &str,
) -> Result<&'a KernelSpecification> {
    if let Some(spec) = catalog.get(declared) {
        info!(kernel = %spec.name, "kernel selected by name");
        return Ok(spec);
    }

    debug!(declared, "no kernel with that name, trying language match");

    catalog
        .values()
        .find(|spec| spec.language() == declared)
        .inspect(|spec| info!(kernel = %spec.name, language = declared, "kernel selected by language"))
        .ok_or_else(|| {
            AppError::KernelNotFound(format!(
                "no kernel named or written in '{declared}' among {} installed",
                catalog.len()
            ))
        })
}
