#![forbid(unsafe_code)]

//! `nbcollect`: run a notebook's code cells on a Jupyter-style kernel and
//! print every message the kernel sends back.
//!
//! Logs go to stderr; stdout carries only the report.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use nbcollect::channel::tcp::TcpLineTransport;
use nbcollect::config::GlobalConfig;
use nbcollect::diagnostics::TracingSink;
use nbcollect::kernel::catalog::{DirectoryDiscovery, KernelCatalog, KernelDiscovery};
use nbcollect::models::notebook::Notebook;
use nbcollect::orchestrator::Orchestrator;
use nbcollect::report::{render_report, summary_line};
use nbcollect::signals::watch_shutdown_signals;
use nbcollect::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "nbcollect", about = "Run notebook cells on a Jupyter kernel", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Kernel to use when the notebook does not name one.
    #[arg(short, long)]
    kernel: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every code cell of a notebook file.
    Collect {
        /// Path to the `.ipynb` document.
        #[arg(long)]
        file: PathBuf,
    },
    /// Run a single snippet.
    Demo {
        /// Code to execute.
        #[arg(long, default_value = "2 + 2")]
        code: String,
    },
    /// List the kernels found on the search path.
    Kernels,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    let result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))
        .and_then(|runtime| runtime.block_on(run(args)));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "nbcollect failed");
            ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(1))
        }
    }
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    let fallback_kernel = args
        .kernel
        .clone()
        .unwrap_or_else(|| config.default_kernel.clone());

    // ── Discover kernels ────────────────────────────────
    let catalog = DirectoryDiscovery::new(config.kernel_search_path()).find_all()?;
    info!(kernels = catalog.len(), "kernel catalog loaded");

    let notebook = match args.command {
        Command::Kernels => return list_kernels(&catalog),
        Command::Collect { file } => Notebook::load_from_path(&file)?,
        Command::Demo { code } => Notebook::from_code([code]),
    };

    // ── Wire interrupt handling ─────────────────────────
    let interrupt = CancellationToken::new();
    watch_shutdown_signals(interrupt.clone())?;

    // ── Run ─────────────────────────────────────────────
    let transport = TcpLineTransport::new(
        config.timeouts.probe_interval(),
        config.timeouts.connect_max_attempts(),
    );
    let orchestrator = Orchestrator::new(config, transport, Arc::new(TracingSink));
    let report = orchestrator
        .run(&notebook, &catalog, &fallback_kernel, interrupt)
        .await?;

    let mut stdout = std::io::stdout().lock();
    render_report(&report, &mut stdout)?;
    info!("{}", summary_line(&report));

    Ok(())
}

fn list_kernels(catalog: &KernelCatalog) -> Result<()> {
    if catalog.is_empty() {
        warn!("no kernels found on the search path");
    }

    let mut stdout = std::io::stdout().lock();
    for (name, kernel) in catalog {
        writeln!(
            stdout,
            "{name}\t{}\t{}\t{}",
            kernel.language(),
            kernel.spec.display_name,
            kernel.resource_dir.display()
        )?;
    }
    Ok(())
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
