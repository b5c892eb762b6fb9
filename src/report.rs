//! Plain-text run report.

use std::io::Write;

use crate::orchestrator::sequencer::SequenceOutcome;
use crate::orchestrator::RunReport;
use crate::{AppError, Result};

/// Write every correlated message of `report` to `out`.
///
/// Requests appear in the order their first message arrived. Each message with
/// non-null content prints as its type on one line followed by the content as
/// pretty JSON.
///
/// # Errors
///
/// Returns `AppError::Io` if writing fails.
pub fn render_report(report: &RunReport, out: &mut impl Write) -> Result<()> {
    for (_request_id, messages) in report.store.iter() {
        for message in messages.iter().filter(|m| !m.content.is_null()) {
            let content = serde_json::to_string_pretty(&message.content)
                .map_err(|err| AppError::Io(format!("cannot format message content: {err}")))?;
            writeln!(out, "{}", message.msg_type())?;
            writeln!(out, "{content}")?;
        }
    }
    out.flush()?;
    Ok(())
}

/// One-line summary of how the run ended.
#[must_use]
pub fn summary_line(report: &RunReport) -> String {
    let submitted = report.executions.len();
    match &report.outcome {
        SequenceOutcome::NothingToRun => {
            format!("{}: no code cells to run", report.kernel_name)
        }
        SequenceOutcome::Completed => {
            format!("{}: {submitted} cell(s) completed", report.kernel_name)
        }
        SequenceOutcome::HaltedOnError { cell_index, .. } => format!(
            "{}: halted on error in cell {cell_index} after {submitted} cell(s)",
            report.kernel_name
        ),
    }
}
