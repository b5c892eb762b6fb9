//! Cell execution sequencing.
//!
//! Code cells run strictly one at a time: a cell's `execute_request` is sent
//! only after the kernel reported `idle` for the previous one. Kernels are
//! single-threaded interpreters and cannot interleave two executions.
//!
//! A cell counts as failed when an `execute_reply` with `status: error` for it
//! has been observed by the time its `idle` status arrives. A failing cell is
//! still waited out to `idle`, then nothing after it is sent.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::models::message::{msg_type, ExecutionState, OutboundMessage, ReplyStatus};
use crate::models::notebook::Notebook;
use crate::orchestrator::correlator::Correlator;
use crate::{AppError, Result};

/// One submitted cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellExecution {
    /// Index of the cell in the document, counting non-code cells.
    pub cell_index: usize,
    /// Id of the `execute_request` sent for the cell.
    pub request_id: String,
    /// Whether the kernel reported an error for the cell.
    pub errored: bool,
}

/// How a sequence ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// The document has no code cells.
    NothingToRun,
    /// Every code cell ran without error.
    Completed,
    /// A cell failed and later cells were not submitted.
    HaltedOnError {
        /// Document index of the failing cell.
        cell_index: usize,
        /// Request id of the failing cell.
        request_id: String,
    },
}

/// Result of running a document's cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceReport {
    /// Submitted cells, in submission order.
    pub executions: Vec<CellExecution>,
    /// Terminal state.
    pub outcome: SequenceOutcome,
}

/// Drives a document's code cells through one kernel.
#[derive(Debug)]
pub struct Sequencer<'a> {
    outbound: &'a mpsc::Sender<OutboundMessage>,
    correlator: &'a mut Correlator,
    session: &'a str,
    cell_timeout: Option<Duration>,
}

impl<'a> Sequencer<'a> {
    /// Create a sequencer sending on `outbound` and waiting through `correlator`.
    #[must_use]
    pub fn new(
        outbound: &'a mpsc::Sender<OutboundMessage>,
        correlator: &'a mut Correlator,
        session: &'a str,
    ) -> Self {
        Self {
            outbound,
            correlator,
            session,
            cell_timeout: None,
        }
    }

    /// Fail a cell that does not go idle within `limit`.
    #[must_use]
    pub fn with_cell_timeout(mut self, limit: Option<Duration>) -> Self {
        self.cell_timeout = limit;
        self
    }

    /// Run every code cell of `notebook` in order, stopping after the first error.
    ///
    /// # Errors
    ///
    /// - `AppError::Channel` if the channel closes mid-run.
    /// - `AppError::Timeout` if a cell exceeds the configured timeout.
    pub async fn run(mut self, notebook: &Notebook) -> Result<SequenceReport> {
        let mut executions = Vec::new();
        let mut outcome = SequenceOutcome::NothingToRun;

        for (cell_index, cell) in notebook.code_cells() {
            let code = cell.source.text();
            let execution = self
                .execute_cell(cell_index, &code)
                .instrument(info_span!("cell", index = cell_index))
                .await?;

            let errored = execution.errored;
            let request_id = execution.request_id.clone();
            executions.push(execution);

            if errored {
                warn!(cell_index, %request_id, "cell failed, halting");
                outcome = SequenceOutcome::HaltedOnError {
                    cell_index,
                    request_id,
                };
                break;
            }
            outcome = SequenceOutcome::Completed;
        }

        info!(cells = executions.len(), ?outcome, "cell sequence finished");
        Ok(SequenceReport {
            executions,
            outcome,
        })
    }

    async fn execute_cell(&mut self, cell_index: usize, code: &str) -> Result<CellExecution> {
        let request = OutboundMessage::execute_request(self.session, code);
        let request_id = request.id().to_owned();

        self.outbound
            .send(request)
            .await
            .map_err(|_| AppError::Channel("outbound channel closed".into()))?;
        debug!(%request_id, "execute_request sent");

        let idle = self
            .correlator
            .await_next(&request_id, msg_type::STATUS, |m| {
                m.execution_state() == Some(ExecutionState::Idle)
            });

        match self.cell_timeout {
            Some(limit) => tokio::time::timeout(limit, idle).await.map_err(|_| {
                AppError::Timeout(format!("cell {cell_index} did not finish within {limit:?}"))
            })??,
            None => idle.await?,
        };

        let errored = self
            .correlator
            .store()
            .find(&request_id, msg_type::EXECUTE_REPLY, |m| {
                m.reply_status() == Some(ReplyStatus::Error)
            })
            .is_some();

        debug!(%request_id, errored, "cell idle");
        Ok(CellExecution {
            cell_index,
            request_id,
            errored,
        })
    }
}
