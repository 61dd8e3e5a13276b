// 📤 CSV export
// Released panel table + the unresolved-identifier quarantine file.
// Missing values are written as empty cells, never as 0.

use crate::error::{PipelineError, Result};
use crate::model::{PanelRow, PANEL_COLUMNS};
use crate::report::ensure_parent;
use crate::resolver::UnresolvedRecord;
use csv::Writer;
use std::io::Write;
use std::path::Path;

pub fn write_panel<W: Write>(writer: W, rows: &[PanelRow], label: &str) -> Result<()> {
    let mut csv = Writer::from_writer(writer);
    csv.write_record(PANEL_COLUMNS)
        .map_err(|e| PipelineError::csv(label, e))?;

    for row in rows {
        csv.write_record([
            row.firm_key.to_string(),
            row.year.to_string(),
            opt(row.lobbying_spend),
            opt(row.lagged_lobbying_spend),
            opt(row.revenue),
            opt(row.net_income),
            opt(row.assets),
            row.industry.clone().unwrap_or_default(),
        ])
        .map_err(|e| PipelineError::csv(label, e))?;
    }

    csv.flush().map_err(|e| PipelineError::io(label, e))
}

pub fn write_panel_file(path: &Path, rows: &[PanelRow]) -> Result<()> {
    ensure_parent(path)?;
    let file = std::fs::File::create(path).map_err(|e| PipelineError::io(path.display(), e))?;
    write_panel(file, rows, &path.display().to_string())
}

/// One line per quarantined record, in the order they were quarantined
pub fn write_quarantine_file(path: &Path, records: &[UnresolvedRecord]) -> Result<()> {
    ensure_parent(path)?;
    let label = path.display().to_string();
    let file = std::fs::File::create(path).map_err(|e| PipelineError::io(&label, e))?;
    let mut csv = Writer::from_writer(file);

    csv.write_record(["stream", "raw_id", "file", "line", "reason", "candidates"])
        .map_err(|e| PipelineError::csv(&label, e))?;
    for record in records {
        let candidates = match &record.failure {
            crate::resolver::ResolutionFailure::Ambiguous { candidates } => candidates
                .iter()
                .map(|k| k.to_string())
                .collect::<Vec<_>>()
                .join(";"),
            _ => String::new(),
        };
        csv.write_record([
            record.stream.code().to_string(),
            record.raw_id.clone(),
            record.file.clone(),
            record.line.to_string(),
            record.failure.code().to_string(),
            candidates,
        ])
        .map_err(|e| PipelineError::csv(&label, e))?;
    }

    csv.flush().map_err(|e| PipelineError::io(&label, e))
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

// ============================================================================
// TESTS
// ============================================================================
