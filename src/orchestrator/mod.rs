//! Run orchestration.
//!
//! [`Orchestrator::run`] takes a notebook from kernel selection to a final
//! [`RunReport`]:
//!
//! 1. select a kernel from the notebook metadata,
//! 2. launch and supervise it,
//! 3. wait for first output, connect, and probe until the kernel answers,
//! 4. run the code cells one at a time,
//! 5. tear everything down.
//!
//! Steps 3 and 4 race against kernel exit and the interrupt token, so either
//! is noticed at every wait. Once the last cell is done the kernel may exit
//! freely: only the interrupt is watched during the late-message drain. Every
//! path after launch ends in [`KernelProcess::cleanup`].

pub mod correlator;
pub mod prober;
pub mod sequencer;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::channel::{ChannelHandle, KernelTransport, MessageChannel};
use crate::config::GlobalConfig;
use crate::diagnostics::DiagnosticSink;
use crate::kernel::catalog::KernelCatalog;
use crate::kernel::connection::ConnectionInfo;
use crate::kernel::selector::{declared_kernel_name, select_kernel};
use crate::kernel::supervisor::{launch_kernel, KernelProcess, LaunchOptions};
use crate::models::message::OutboundMessage;
use crate::models::notebook::Notebook;
use crate::{AppError, Result};

use self::correlator::{CorrelationStore, Correlator};
use self::prober::ProbePolicy;
use self::sequencer::{CellExecution, SequenceOutcome, SequenceReport, Sequencer};

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Kernel the notebook ran on.
    pub kernel_name: String,
    /// Content of the kernel's `kernel_info_reply`.
    pub kernel_info: Value,
    /// Submitted cells in order.
    pub executions: Vec<CellExecution>,
    /// How the cell sequence ended.
    pub outcome: SequenceOutcome,
    /// Every correlated message, probes included.
    pub store: CorrelationStore,
}

/// Runs notebooks against kernels reached through `T`.
pub struct Orchestrator<T> {
    config: GlobalConfig,
    transport: T,
    sink: Arc<dyn DiagnosticSink>,
}

impl<T: KernelTransport> Orchestrator<T> {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(config: GlobalConfig, transport: T, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            config,
            transport,
            sink,
        }
    }

    /// Run `notebook` on the kernel its metadata names, or on `fallback_kernel`.
    ///
    /// Cancelling `interrupt` aborts the run at its next wait.
    ///
    /// # Errors
    ///
    /// - `AppError::KernelNotFound` / `AppError::LaunchFailed` before launch.
    /// - `AppError::EarlyExit` if the kernel exits before the last cell is done.
    /// - `AppError::Interrupted` if `interrupt` fires.
    /// - `AppError::Channel` / `AppError::Timeout` from the handshake or cells.
    ///
    /// A failing cell is not an error; see [`SequenceOutcome::HaltedOnError`].
    pub async fn run(
        &self,
        notebook: &Notebook,
        catalog: &KernelCatalog,
        fallback_kernel: &str,
        interrupt: CancellationToken,
    ) -> Result<RunReport> {
        let declared = declared_kernel_name(&notebook.metadata, fallback_kernel);
        let spec = select_kernel(catalog, declared)?;

        let options = LaunchOptions {
            working_directory: self.config.working_directory.clone(),
            runtime_dir: self.config.runtime_dir.clone(),
            kill_grace: self.config.timeouts.kill_grace(),
        };
        let mut process = launch_kernel(spec, &options, Arc::clone(&self.sink))?;

        let span = info_span!("run", kernel = %spec.name, pid = process.pid().unwrap_or(0));
        let result = async {
            let finished = self.supervise(notebook, &mut process, &interrupt).await?;
            self.wind_down(finished, &interrupt).await
        }
        .instrument(span)
        .await;

        process.cleanup().await;

        let (kernel_info, report, store) = result?;
        Ok(RunReport {
            kernel_name: spec.name.clone(),
            kernel_info,
            executions: report.executions,
            outcome: report.outcome,
            store,
        })
    }

    /// Race the run up to the last cell against interrupt and kernel exit.
    async fn supervise(
        &self,
        notebook: &Notebook,
        process: &mut KernelProcess,
        interrupt: &CancellationToken,
    ) -> Result<Sequenced> {
        let started = process.started_flag();
        let connection = process.connection().clone();
        let drive = self.drive(notebook, &started, &connection);

        tokio::select! {
            biased;

            () = interrupt.cancelled() => {
                warn!("interrupt received, tearing down");
                Err(AppError::Interrupted)
            }

            exit = process.exited() => {
                if exit.success() {
                    warn!("kernel exited cleanly before the run finished");
                } else {
                    warn!(code = ?exit.code, "kernel exited early");
                }
                Err(AppError::EarlyExit { code: exit.exit_code() })
            }

            result = drive => result,
        }
    }

    async fn drive(
        &self,
        notebook: &Notebook,
        started: &AtomicBool,
        connection: &ConnectionInfo,
    ) -> Result<Sequenced> {
        let timeouts = &self.config.timeouts;
        let policy = ProbePolicy::from(timeouts);

        prober::wait_for_start(started, &policy).await?;

        let MessageChannel {
            outbound,
            inbound,
            handle,
        } = self.transport.open(connection).await?;
        let mut correlator = Correlator::new(inbound);
        let session = Uuid::new_v4().to_string();

        let kernel_info =
            prober::probe_until_ready(&outbound, &mut correlator, &session, &policy).await?;

        let report = Sequencer::new(&outbound, &mut correlator, &session)
            .with_cell_timeout(timeouts.cell_timeout())
            .run(notebook)
            .await?;

        Ok(Sequenced {
            kernel_info,
            report,
            correlator,
            outbound,
            handle,
        })
    }

    /// Collect late messages and close the channel.
    ///
    /// The sequence is already complete, so kernel exit no longer matters
    /// here. An interrupt still aborts the run.
    async fn wind_down(
        &self,
        finished: Sequenced,
        interrupt: &CancellationToken,
    ) -> Result<(Value, SequenceReport, CorrelationStore)> {
        let Sequenced {
            kernel_info,
            report,
            mut correlator,
            outbound,
            handle,
        } = finished;

        if let Some(delay) = self.config.timeouts.drain_delay() {
            tokio::select! {
                biased;

                () = interrupt.cancelled() => {
                    warn!("interrupt received during drain, tearing down");
                    return Err(AppError::Interrupted);
                }
                () = correlator.drain_for(delay) => {}
            }
        }

        drop(outbound);
        handle.close().await;
        info!(requests = correlator.store().len(), "run complete");

        Ok((kernel_info, report, correlator.into_store()))
    }
}

/// A run whose cell sequence has finished, with its channel still open.
struct Sequenced {
    kernel_info: Value,
    report: SequenceReport,
    correlator: Correlator,
    outbound: mpsc::Sender<OutboundMessage>,
    handle: ChannelHandle,
}
