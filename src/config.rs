// ⚙️ Pipeline configuration (TOML)
//
// Column names, input locations, join type and resolution policy are all
// configuration. The join type has no default: the analyst must choose it.

use crate::assembler::JoinType;
use crate::error::{PipelineError, Result};
use crate::estimation::EstimationSpec;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub join: JoinType,

    #[serde(default = "default_true")]
    pub parallel: bool,

    pub inputs: InputConfig,
    pub filings: FilingsConfig,
    pub financials: FinancialsConfig,
    pub crosswalk: CrosswalkConfig,

    #[serde(default)]
    pub resolution: ResolutionConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    pub output: OutputConfig,

    #[serde(default)]
    pub estimation: Option<EstimationSpec>,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if let Some(threshold) = self.resolution.fuzzy_threshold {
            if !(threshold > 0.0 && threshold <= 1.0) {
                return Err(PipelineError::Config(format!(
                    "resolution.fuzzy_threshold must be in (0, 1], got {}",
                    threshold
                )));
            }
        }
        for (stream, candidates) in [
            ("filings", &self.inputs.filings),
            ("financials", &self.inputs.financials),
            ("crosswalk", &self.inputs.crosswalk),
        ] {
            if candidates.is_empty() {
                return Err(PipelineError::Config(format!(
                    "inputs.{} must list at least one file name",
                    stream
                )));
            }
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

// ============================================================================
// INPUTS
// ============================================================================

/// Where the manually acquired source files live. Each stream lists candidate
/// file names; the first one present is used.
#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    pub filings: Vec<String>,
    pub financials: Vec<String>,
    pub crosswalk: Vec<String>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/raw")
}

/// Input files actually chosen for a run
#[derive(Debug, Clone)]
pub struct LocatedInputs {
    pub filings: PathBuf,
    pub financials: PathBuf,
    pub crosswalk: PathBuf,
}

impl InputConfig {
    pub fn locate(&self) -> Result<LocatedInputs> {
        Ok(LocatedInputs {
            filings: locate_one(&self.data_dir, "filings", &self.filings)?,
            financials: locate_one(&self.data_dir, "financials", &self.financials)?,
            crosswalk: locate_one(&self.data_dir, "crosswalk", &self.crosswalk)?,
        })
    }
}

/// Pick the first candidate that exists under `data_dir`
pub fn locate_one(data_dir: &Path, stream: &str, candidates: &[String]) -> Result<PathBuf> {
    for name in candidates {
        let path = data_dir.join(name);
        if path.is_file() {
            info!(stream, path = %path.display(), "located input file");
            return Ok(path);
        }
    }
    Err(PipelineError::Config(format!(
        "no {} file found in {} (tried: {}); download the source datasets first",
        stream,
        data_dir.display(),
        candidates.join(", ")
    )))
}

// ============================================================================
// STREAM SCHEMAS
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct FilingsConfig {
    pub columns: FilingColumns,
    pub filing_type: FilingTypeSource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilingColumns {
    pub client: String,
    pub period: String,
    pub amount: String,
}

/// How a filing's type is recorded in the source
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FilingTypeSource {
    /// One column holding original / amendment / no-activity
    Column { column: String },
    /// Two boolean columns, LobbyView style (`is_amendment`, `is_no_activity`)
    Flags {
        amendment: String,
        no_activity: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct FinancialsConfig {
    pub columns: FinancialColumns,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FinancialColumns {
    pub firm: String,
    pub year: String,
    pub revenue: String,
    pub net_income: String,
    pub assets: String,
    pub industry: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrosswalkConfig {
    pub columns: CrosswalkColumns,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrosswalkColumns {
    pub variant: String,
    pub canonical: String,
    /// Optional scope column (lobbying / financial / blank)
    #[serde(default)]
    pub stream: Option<String>,
}

// ============================================================================
// POLICY
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ResolutionConfig {
    /// Identifiers that already are canonical keys resolve to themselves
    #[serde(default = "default_true")]
    pub identity_keys: bool,

    /// Exact normalized-name fallback
    #[serde(default)]
    pub name_fallback: bool,

    /// Fuzzy fallback; absent = disabled
    #[serde(default)]
    pub fuzzy_threshold: Option<f64>,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        ResolutionConfig {
            identity_keys: true,
            name_fallback: false,
            fuzzy_threshold: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_sample_limit")]
    pub sample_limit: usize,
}

fn default_sample_limit() -> usize {
    20
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig {
            sample_limit: default_sample_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub panel: PathBuf,
    pub report: PathBuf,
    #[serde(default)]
    pub quarantine: Option<PathBuf>,
    #[serde(default)]
    pub sqlite: Option<PathBuf>,
    #[serde(default)]
    pub estimation_spec: Option<PathBuf>,
}

// ============================================================================
// TESTS
// ============================================================================
