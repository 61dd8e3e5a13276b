// 📐 Shape Layer - per-stream ingest schemas
// Binds a stream's logical fields to the configured CSV columns and rejects
// files that are missing required columns before any row is read.

use crate::config::{CrosswalkColumns, FilingColumns, FilingTypeSource, FinancialColumns};
use crate::error::{PipelineError, Result};
use crate::model::SourceStream;
use csv::StringRecord;
use std::collections::HashMap;

// ============================================================================
// FIELD SPEC
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Logical name used by the pipeline ("client", "period", ...)
    pub name: &'static str,
    /// Column header expected in the source file
    pub column: String,
    pub required: bool,
}

impl FieldSpec {
    pub fn required(name: &'static str, column: &str) -> Self {
        FieldSpec {
            name,
            column: column.to_string(),
            required: true,
        }
    }

    pub fn optional(name: &'static str, column: &str) -> Self {
        FieldSpec {
            name,
            column: column.to_string(),
            required: false,
        }
    }
}

// ============================================================================
// STREAM SCHEMA
// ============================================================================

/// Typed field set for one input stream
#[derive(Debug, Clone)]
pub struct StreamSchema {
    pub name: &'static str,
    pub fields: Vec<FieldSpec>,
}

impl StreamSchema {
    pub fn filings(columns: &FilingColumns, filing_type: &FilingTypeSource) -> Self {
        let mut fields = vec![
            FieldSpec::required("client", &columns.client),
            FieldSpec::required("period", &columns.period),
            FieldSpec::required("amount", &columns.amount),
        ];
        match filing_type {
            FilingTypeSource::Column { column } => {
                fields.push(FieldSpec::required("filing_type", column));
            }
            FilingTypeSource::Flags {
                amendment,
                no_activity,
            } => {
                fields.push(FieldSpec::required("is_amendment", amendment));
                fields.push(FieldSpec::required("is_no_activity", no_activity));
            }
        }
        StreamSchema {
            name: SourceStream::Lobbying.code(),
            fields,
        }
    }

    pub fn financials(columns: &FinancialColumns) -> Self {
        StreamSchema {
            name: SourceStream::Financial.code(),
            fields: vec![
                FieldSpec::required("firm", &columns.firm),
                FieldSpec::required("year", &columns.year),
                FieldSpec::required("revenue", &columns.revenue),
                FieldSpec::required("net_income", &columns.net_income),
                FieldSpec::required("assets", &columns.assets),
                FieldSpec::required("industry", &columns.industry),
            ],
        }
    }

    pub fn crosswalk(columns: &CrosswalkColumns) -> Self {
        let mut fields = vec![
            FieldSpec::required("variant", &columns.variant),
            FieldSpec::required("canonical", &columns.canonical),
        ];
        if let Some(stream) = columns.stream.as_deref().filter(|s| !s.trim().is_empty()) {
            fields.push(FieldSpec::optional("stream", stream));
        }
        StreamSchema {
            name: "crosswalk",
            fields,
        }
    }

    /// Resolve every field to a column index.
    ///
    /// Header matching is exact after trimming (and a leading UTF-8 BOM is ignored).
    /// All missing required columns are reported together.
    pub fn bind(&self, headers: &StringRecord, file: &str) -> Result<BoundSchema> {
        let positions: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(idx, h)| (h.trim_start_matches('\u{feff}').trim().to_string(), idx))
            .collect();

        let mut indices = HashMap::new();
        let mut missing = Vec::new();

        for field in &self.fields {
            match positions.get(field.column.trim()) {
                Some(idx) => {
                    indices.insert(field.name, *idx);
                }
                None if field.required => missing.push(field.column.clone()),
                None => {}
            }
        }

        if !missing.is_empty() {
            return Err(PipelineError::schema(
                file,
                1,
                format!(
                    "{} file is missing required column(s): {}",
                    self.name,
                    missing.join(", ")
                ),
            ));
        }

        Ok(BoundSchema { indices })
    }
}

// ============================================================================
// BOUND SCHEMA
// ============================================================================

/// A schema bound to one file's header row
#[derive(Debug, Clone)]
pub struct BoundSchema {
    indices: HashMap<&'static str, usize>,
}

impl BoundSchema {
    /// Trimmed cell for a logical field; empty when the field is optional and absent
    pub fn get<'r>(&self, record: &'r StringRecord, field: &str) -> &'r str {
        self.indices
            .get(field)
            .and_then(|idx| record.get(*idx))
            .map(str::trim)
            .unwrap_or("")
    }

    pub fn has(&self, field: &str) -> bool {
        self.indices.contains_key(field)
    }
}

// ============================================================================
// TESTS
// ============================================================================
