// ⚠️ Pipeline errors
// Fatal conditions only. Recoverable conditions (unresolved identifiers, duplicate
// firm-years) are quarantined and reported, never raised.

use crate::validator::ValidationReport;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {file}: {source}")]
    Csv {
        file: String,
        #[source]
        source: csv::Error,
    },

    /// The offending source file is rejected wholesale
    #[error("Schema violation in {file} (line {line}): {detail}")]
    Schema {
        file: String,
        line: usize,
        detail: String,
    },

    #[error("Crosswalk conflict in {file}:{line}: '{variant}' → '{existing}' and '{conflicting}'")]
    CrosswalkConflict {
        file: String,
        line: usize,
        variant: String,
        existing: String,
        conflicting: String,
    },

    #[error("Panel validation failed: {}", .0.summary())]
    ValidationFailed(Box<ValidationReport>),

    #[error("Estimation input rejected: {0}")]
    Estimation(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PipelineError {
    pub fn schema(file: &str, line: usize, detail: impl Into<String>) -> Self {
        PipelineError::Schema {
            file: file.to_string(),
            line,
            detail: detail.into(),
        }
    }

    pub fn io(path: impl std::fmt::Display, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.to_string(),
            source,
        }
    }

    pub fn csv(file: &str, source: csv::Error) -> Self {
        PipelineError::Csv {
            file: file.to_string(),
            source,
        }
    }

    /// Validation failures exit with a distinct status so callers can tell
    /// "untrusted result" apart from "could not run"
    pub fn is_validation_failure(&self) -> bool {
        matches!(self, PipelineError::ValidationFailed(_))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
