// 🏗️ Source readers
// One reader per input stream. Readers only bind headers and copy cells into
// raw records (with provenance); interpretation happens in later stages.

use crate::config::{CrosswalkColumns, FilingColumns, FilingTypeSource, FinancialColumns};
use crate::error::{PipelineError, Result};
use crate::model::{FilingTypeCell, Provenance, RawFiling, RawFinancial};
use crate::schema::{BoundSchema, StreamSchema};
use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::Read;
use std::path::Path;

// ============================================================================
// SOURCE READER TRAIT
// ============================================================================

/// SourceReader - one implementation per input stream
pub trait SourceReader {
    type Record;

    /// Schema this reader binds against the header row
    fn schema(&self) -> &StreamSchema;

    /// Build one record from a data row
    fn record(
        &self,
        bound: &BoundSchema,
        row: &StringRecord,
        provenance: Provenance,
    ) -> Self::Record;

    /// Reader version (for provenance tracking)
    fn version(&self) -> &str {
        "1.0.0"
    }

    /// Read every row from any byte source. `file` names the source in diagnostics.
    fn read_from<R: Read>(&self, reader: R, file: &str) -> Result<Vec<Self::Record>> {
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|e| PipelineError::csv(file, e))?
            .clone();
        let bound = self.schema().bind(&headers, file)?;

        let mut records = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let row = result.map_err(|e| PipelineError::csv(file, e))?;
            let line = row
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(idx + 2); // 1-indexed + header row
            records.push(self.record(&bound, &row, Provenance::new(file, line)));
        }

        Ok(records)
    }

    /// Read a file from disk
    fn read_path(&self, path: &Path) -> Result<Vec<Self::Record>> {
        let file = File::open(path).map_err(|e| PipelineError::io(path.display(), e))?;
        self.read_from(file, &file_label(path))
    }

    /// Bind the header row only (used by `check`)
    fn check_headers(&self, path: &Path) -> Result<()> {
        let file = File::open(path).map_err(|e| PipelineError::io(path.display(), e))?;
        let label = file_label(path);
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
        let headers = reader
            .headers()
            .map_err(|e| PipelineError::csv(&label, e))?
            .clone();
        self.schema().bind(&headers, &label).map(|_| ())
    }
}

pub fn file_label(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.csv")
        .to_string()
}

// ============================================================================
// FILINGS
// ============================================================================

/// Lobbying disclosure reports (e.g. LobbyView `reports.csv`)
pub struct FilingReader {
    schema: StreamSchema,
    flags: bool,
}

impl FilingReader {
    pub fn new(columns: &FilingColumns, filing_type: &FilingTypeSource) -> Self {
        FilingReader {
            schema: StreamSchema::filings(columns, filing_type),
            flags: matches!(filing_type, FilingTypeSource::Flags { .. }),
        }
    }
}

impl SourceReader for FilingReader {
    type Record = RawFiling;

    fn schema(&self) -> &StreamSchema {
        &self.schema
    }

    fn record(&self, bound: &BoundSchema, row: &StringRecord, provenance: Provenance) -> RawFiling {
        let filing_type = if self.flags {
            FilingTypeCell::Flags {
                amendment: bound.get(row, "is_amendment").to_string(),
                no_activity: bound.get(row, "is_no_activity").to_string(),
            }
        } else {
            FilingTypeCell::Column(bound.get(row, "filing_type").to_string())
        };

        RawFiling {
            client_id: bound.get(row, "client").to_string(),
            period: bound.get(row, "period").to_string(),
            amount: bound.get(row, "amount").to_string(),
            filing_type,
            provenance,
        }
    }
}

// ============================================================================
// FINANCIALS
// ============================================================================

/// Firm financial statements (e.g. a Compustat annual extract)
pub struct FinancialReader {
    schema: StreamSchema,
}

impl FinancialReader {
    pub fn new(columns: &FinancialColumns) -> Self {
        FinancialReader {
            schema: StreamSchema::financials(columns),
        }
    }
}

impl SourceReader for FinancialReader {
    type Record = RawFinancial;

    fn schema(&self) -> &StreamSchema {
        &self.schema
    }

    fn record(
        &self,
        bound: &BoundSchema,
        row: &StringRecord,
        provenance: Provenance,
    ) -> RawFinancial {
        RawFinancial {
            firm_id: bound.get(row, "firm").to_string(),
            year: bound.get(row, "year").to_string(),
            revenue: bound.get(row, "revenue").to_string(),
            net_income: bound.get(row, "net_income").to_string(),
            assets: bound.get(row, "assets").to_string(),
            industry: bound.get(row, "industry").to_string(),
            provenance,
        }
    }
}

// ============================================================================
// CROSSWALK
// ============================================================================

/// One roster row: identifier variant → canonical key, optionally scoped to a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrosswalkRow {
    pub variant: String,
    pub canonical: String,
    pub scope: String,
    pub provenance: Provenance,
}

/// Identifier roster (e.g. LobbyView `clients.csv`: lob_id → gvkey)
pub struct CrosswalkReader {
    schema: StreamSchema,
}

impl CrosswalkReader {
    pub fn new(columns: &CrosswalkColumns) -> Self {
        CrosswalkReader {
            schema: StreamSchema::crosswalk(columns),
        }
    }
}

impl SourceReader for CrosswalkReader {
    type Record = CrosswalkRow;

    fn schema(&self) -> &StreamSchema {
        &self.schema
    }

    fn record(
        &self,
        bound: &BoundSchema,
        row: &StringRecord,
        provenance: Provenance,
    ) -> CrosswalkRow {
        CrosswalkRow {
            variant: bound.get(row, "variant").to_string(),
            canonical: bound.get(row, "canonical").to_string(),
            scope: bound.get(row, "stream").to_string(),
            provenance,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
