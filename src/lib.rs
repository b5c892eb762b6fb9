#![forbid(unsafe_code)]

//! Notebook execution against Jupyter-style kernels.
//!
//! Selects a kernel for a notebook, launches and supervises it, waits until it
//! answers on its message channel, then runs the notebook's code cells one at
//! a time and collects every message the kernel sends back.

pub mod channel;
pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod kernel;
pub mod models;
pub mod orchestrator;
pub mod report;
pub mod signals;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
