// ✅ Panel Validator
// Fixed battery of checks run against the assembled panel before release.
// Output is a structured report (counts + samples per category), never a bare flag.

use crate::entities::Crosswalk;
use crate::model::{FirmKey, LobbyingObservation, Money, PanelRow};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{info, warn};

// ============================================================================
// FAILURE CATEGORIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    DuplicateKey,    // Two rows share (firm key, year)
    UnresolvedKey,   // Firm key is not a canonical crosswalk key
    NegativeValue,   // Spend, revenue or assets below zero
    MissingIndustry, // Financial figures present, industry absent
    LagMismatch,     // Lag disagrees with the lobbying stream's t-1 spend
}

impl FailureCategory {
    pub const ALL: [FailureCategory; 5] = [
        FailureCategory::DuplicateKey,
        FailureCategory::UnresolvedKey,
        FailureCategory::NegativeValue,
        FailureCategory::MissingIndustry,
        FailureCategory::LagMismatch,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            FailureCategory::DuplicateKey => "duplicate_key",
            FailureCategory::UnresolvedKey => "unresolved_key",
            FailureCategory::NegativeValue => "negative_value",
            FailureCategory::MissingIndustry => "missing_industry",
            FailureCategory::LagMismatch => "lag_mismatch",
        }
    }
}

// ============================================================================
// VALIDATION REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub firm: FirmKey,
    pub year: i32,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryOutcome {
    pub count: usize,
    pub samples: Vec<Violation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub rows_checked: usize,
    pub passed: bool,
    pub categories: BTreeMap<FailureCategory, CategoryOutcome>,
}

impl ValidationReport {
    fn new(rows_checked: usize) -> Self {
        ValidationReport {
            rows_checked,
            passed: true,
            categories: FailureCategory::ALL
                .iter()
                .map(|c| (*c, CategoryOutcome::default()))
                .collect(),
        }
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn count(&self, category: FailureCategory) -> usize {
        self.categories.get(&category).map_or(0, |c| c.count)
    }

    pub fn total_violations(&self) -> usize {
        self.categories.values().map(|c| c.count).sum()
    }

    pub fn summary(&self) -> String {
        let failing: Vec<String> = self
            .categories
            .iter()
            .filter(|(_, outcome)| outcome.count > 0)
            .map(|(category, outcome)| format!("{}={}", category.code(), outcome.count))
            .collect();

        if failing.is_empty() {
            format!("{} rows, all checks passed", self.rows_checked)
        } else {
            format!(
                "{} rows, {} violations ({})",
                self.rows_checked,
                self.total_violations(),
                failing.join(", ")
            )
        }
    }
}

// ============================================================================
// PANEL VALIDATOR
// ============================================================================

pub struct PanelValidator {
    sample_limit: usize,
}

impl PanelValidator {
    pub fn new(sample_limit: usize) -> Self {
        PanelValidator { sample_limit }
    }

    pub fn validate(
        &self,
        rows: &[PanelRow],
        crosswalk: &Crosswalk,
        lobbying: &[LobbyingObservation],
    ) -> ValidationReport {
        let mut report = ValidationReport::new(rows.len());

        let spend: HashMap<(&FirmKey, i32), Money> =
            lobbying.iter().map(|o| ((&o.firm, o.year), o.spend)).collect();
        let mut seen: HashSet<(&FirmKey, i32)> = HashSet::new();

        for row in rows {
            // 1. Uniqueness
            if !seen.insert((&row.firm_key, row.year)) {
                let detail = "firm-year appears more than once".to_string();
                self.flag(&mut report, FailureCategory::DuplicateKey, row, detail);
            }

            // 2. Referential completeness
            if !crosswalk.contains_key(&row.firm_key) {
                let detail = "firm key not in crosswalk".to_string();
                self.flag(&mut report, FailureCategory::UnresolvedKey, row, detail);
            }

            // 3. Range sanity (net income may be negative)
            let negative_money = |m: Option<Money>| m.map_or(false, |m| m.is_negative());
            let negative_figure = |v: Option<f64>| v.map_or(false, |v| v < 0.0);
            for (field, negative) in [
                ("lobbying_spend", negative_money(row.lobbying_spend)),
                ("lagged_lobbying_spend", negative_money(row.lagged_lobbying_spend)),
                ("revenue", negative_figure(row.revenue)),
                ("assets", negative_figure(row.assets)),
            ] {
                if negative {
                    let detail = format!("{} is negative", field);
                    self.flag(&mut report, FailureCategory::NegativeValue, row, detail);
                }
            }

            if row.has_financials() && row.industry.is_none() {
                let detail = "financial data without industry".to_string();
                self.flag(&mut report, FailureCategory::MissingIndustry, row, detail);
            }

            // 4. Lag consistency, both directions
            let expected = spend.get(&(&row.firm_key, row.year - 1)).copied();
            if row.lagged_lobbying_spend != expected {
                let detail = format!(
                    "lagged spend {} but lobbying stream has {} for {}",
                    describe(row.lagged_lobbying_spend),
                    describe(expected),
                    row.year - 1
                );
                self.flag(&mut report, FailureCategory::LagMismatch, row, detail);
            }
        }

        report.passed = report.total_violations() == 0;

        if report.passed {
            info!(rows = report.rows_checked, "panel validation passed");
        } else {
            warn!(
                rows = report.rows_checked,
                violations = report.total_violations(),
                summary = %report.summary(),
                "panel validation failed"
            );
        }

        report
    }

    fn flag(
        &self,
        report: &mut ValidationReport,
        category: FailureCategory,
        row: &PanelRow,
        detail: String,
    ) {
        let outcome = report.categories.entry(category).or_default();
        outcome.count += 1;
        if outcome.samples.len() < self.sample_limit {
            outcome.samples.push(Violation {
                firm: row.firm_key.clone(),
                year: row.year,
                detail,
            });
        }
    }
}

fn describe(value: Option<Money>) -> String {
    match value {
        Some(m) => m.to_string(),
        None => "missing".to_string(),
    }
}

// ============================================================================
// TESTS
// ============================================================================
