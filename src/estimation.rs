// 📐 Estimation contract
// The panel builder never estimates. It hands a closed input downstream:
// the released panel + a lag choice + a fixed-effects choice.

use crate::error::{PipelineError, Result};
use crate::model::{PanelRow, PANEL_COLUMNS};
use crate::report::ensure_parent;
use crate::validator::ValidationReport;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixedEffects {
    Entity,
    Time,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LagChoice {
    Contemporaneous,
    Lagged,
}

impl LagChoice {
    /// Panel column used as the lobbying regressor
    pub fn regressor(&self) -> &'static str {
        match self {
            LagChoice::Contemporaneous => "lobbying_spend",
            LagChoice::Lagged => "lagged_lobbying_spend",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationSpec {
    pub fixed_effects: FixedEffects,
    pub lag: LagChoice,
    pub dependent: String,
    #[serde(default)]
    pub controls: Vec<String>,
}

const NUMERIC_COLUMNS: [&str; 5] = [
    "lobbying_spend",
    "lagged_lobbying_spend",
    "revenue",
    "net_income",
    "assets",
];

impl EstimationSpec {
    /// Fixed-effect grouping columns carried by the panel
    pub fn grouping_columns(&self) -> Vec<&'static str> {
        match self.fixed_effects {
            FixedEffects::Entity => vec!["firm_key"],
            FixedEffects::Time => vec!["year"],
            FixedEffects::Both => vec!["firm_key", "year"],
        }
    }

    /// Every named column must be a numeric panel column other than the regressor
    pub fn check(&self) -> Result<()> {
        let mut named = vec![self.dependent.as_str()];
        named.extend(self.controls.iter().map(|c| c.as_str()));

        for column in &named {
            if !PANEL_COLUMNS.contains(column) {
                return Err(PipelineError::Estimation(format!(
                    "column '{}' is not a panel column (available: {})",
                    column,
                    PANEL_COLUMNS.join(", ")
                )));
            }
            if !NUMERIC_COLUMNS.contains(column) {
                return Err(PipelineError::Estimation(format!(
                    "column '{}' is not numeric",
                    column
                )));
            }
        }

        let regressor = self.lag.regressor();
        if named.contains(&regressor) {
            return Err(PipelineError::Estimation(format!(
                "'{}' is already the lobbying regressor for lag = {:?}",
                regressor, self.lag
            )));
        }

        Ok(())
    }
}

// ============================================================================
// ESTIMATION INPUT
// ============================================================================

/// A panel that passed validation + a checked specification
#[derive(Debug, Clone)]
pub struct EstimationInput<'a> {
    pub rows: &'a [PanelRow],
    pub spec: EstimationSpec,
}

impl<'a> EstimationInput<'a> {
    /// `validation` must be the passing report produced for exactly these rows
    pub fn new(
        rows: &'a [PanelRow],
        validation: &ValidationReport,
        spec: EstimationSpec,
    ) -> Result<Self> {
        spec.check()?;

        if !validation.passed() {
            return Err(PipelineError::Estimation(format!(
                "panel did not pass validation: {}",
                validation.summary()
            )));
        }
        if validation.rows_checked != rows.len() {
            return Err(PipelineError::Estimation(format!(
                "validation covered {} rows but the panel has {}",
                validation.rows_checked,
                rows.len()
            )));
        }

        Ok(EstimationInput { rows, spec })
    }

    pub fn regressor(&self) -> &'static str {
        self.spec.lag.regressor()
    }
}

// ============================================================================
// MANIFEST + ADAPTER
// ============================================================================

/// JSON manifest written next to a released panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationManifest {
    pub run_id: String,
    pub panel: PathBuf,
    pub rows: usize,
    pub regressor: String,
    pub grouping: Vec<String>,
    #[serde(flatten)]
    pub spec: EstimationSpec,
}

impl EstimationManifest {
    pub fn new(run_id: &str, panel: &Path, input: &EstimationInput) -> Self {
        EstimationManifest {
            run_id: run_id.to_string(),
            panel: panel.to_path_buf(),
            rows: input.rows.len(),
            regressor: input.regressor().to_string(),
            grouping: input
                .spec
                .grouping_columns()
                .iter()
                .map(|c| c.to_string())
                .collect(),
            spec: input.spec.clone(),
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        ensure_parent(path)?;
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| PipelineError::io(path.display(), e))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
    pub term: String,
    pub estimate: f64,
    pub std_error: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientTable {
    pub observations: usize,
    pub coefficients: Vec<Coefficient>,
}

/// Downstream estimator seam. Implemented outside this crate.
pub trait EstimationAdapter {
    fn name(&self) -> &str;

    fn estimate(&self, input: &EstimationInput) -> Result<CoefficientTable>;
}

// ============================================================================
// TESTS
// ============================================================================
