// 📋 Run report
// One JSON document per run: what went in (fingerprinted), what was dropped
// and why, what came out, and whether the panel was released.

use crate::assembler::{AssemblySummary, JoinType, PanelShape};
use crate::deduplication::DuplicateRecord;
use crate::error::{PipelineError, Result};
use crate::financials::FinancialStats;
use crate::normalizer::NormalizationStats;
use crate::resolver::{ResolutionAudit, UnresolvedSummary};
use crate::validator::ValidationReport;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

// ============================================================================
// INPUT FINGERPRINTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputFingerprint {
    pub role: String,
    pub path: PathBuf,
    pub sha256: String,
    pub rows: usize,
}

/// SHA-256 of a file's bytes, hex encoded
pub fn fingerprint_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| PipelineError::io(path.display(), e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|e| PipelineError::io(path.display(), e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// RUN REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub join: JoinType,
    pub inputs: Vec<InputFingerprint>,
    pub crosswalk_variants: usize,
    pub crosswalk_keys: usize,
    pub normalization: NormalizationStats,
    pub financials: FinancialStats,
    pub resolution: ResolutionAudit,
    pub unresolved: UnresolvedSummary,
    pub duplicates: Vec<DuplicateRecord>,
    pub assembly: AssemblySummary,
    pub shape: PanelShape,
    pub validation: ValidationReport,
    /// True only when validation passed and the panel was written
    pub released: bool,
    pub outputs: Vec<PathBuf>,
}

impl RunReport {
    pub fn write_json(&self, path: &Path) -> Result<()> {
        ensure_parent(path)?;
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| PipelineError::io(path.display(), e))
    }
}

/// Create the parent directory of an output path if needed
pub fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent.display(), e))
        }
        _ => Ok(()),
    }
}

// ============================================================================
// TESTS
// ============================================================================
