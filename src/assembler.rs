// 🧩 Panel Assembler
//
// LobbyingObservation ─┐
//                      ├─ join (inner | left-on-financial) → PanelRow
// FinancialObservation ┘
//
// The lag is looked up in the lobbying stream alone, never in the joined panel,
// so a firm-year dropped by the join still feeds next year's lag.

use crate::model::{FinancialObservation, FirmKey, LobbyingObservation, Money, PanelRow};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::info;

// ============================================================================
// JOIN TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JoinType {
    /// Firm-years present in both streams
    Inner,
    /// Every financial firm-year; lobbying fields missing when absent
    LeftOnFinancial,
}

impl JoinType {
    pub fn code(&self) -> &'static str {
        match self {
            JoinType::Inner => "inner",
            JoinType::LeftOnFinancial => "left-on-financial",
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for JoinType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "inner" => Ok(JoinType::Inner),
            "left-on-financial" | "left_on_financial" | "left" => Ok(JoinType::LeftOnFinancial),
            other => Err(format!(
                "unknown join type '{}' (expected inner or left-on-financial)",
                other
            )),
        }
    }
}

// ============================================================================
// SUMMARY TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssemblySummary {
    pub join: JoinType,
    pub rows: usize,
    pub financial_without_lobbying: usize,
    pub lobbying_without_financials: usize,
    pub rows_with_lag: usize,
}

/// Shape of the emitted panel. Unbalanced panels are documented, not "fixed".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelShape {
    pub rows: usize,
    pub firms: usize,
    pub years: usize,
    pub min_year: Option<i32>,
    pub max_year: Option<i32>,
    pub balanced: bool,
    /// Firms with at least one missing year between their first and last
    pub firms_with_gaps: Vec<FirmKey>,
}

impl PanelShape {
    pub fn of(rows: &[PanelRow]) -> Self {
        let mut years_by_firm: BTreeMap<&FirmKey, BTreeSet<i32>> = BTreeMap::new();
        let mut all_years: BTreeSet<i32> = BTreeSet::new();
        for row in rows {
            years_by_firm.entry(&row.firm_key).or_default().insert(row.year);
            all_years.insert(row.year);
        }

        let min_year = all_years.iter().next().copied();
        let max_year = all_years.iter().next_back().copied();
        let span = match (min_year, max_year) {
            (Some(lo), Some(hi)) => (hi - lo + 1) as usize,
            _ => 0,
        };

        let balanced = years_by_firm.values().all(|years| years.len() == span);
        let firms_with_gaps = years_by_firm
            .iter()
            .filter(|(_, years)| match (years.iter().next(), years.iter().next_back()) {
                (Some(lo), Some(hi)) => ((hi - lo + 1) as usize) > years.len(),
                _ => false,
            })
            .map(|(firm, _)| (*firm).clone())
            .collect();

        PanelShape {
            rows: rows.len(),
            firms: years_by_firm.len(),
            years: all_years.len(),
            min_year,
            max_year,
            balanced,
            firms_with_gaps,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssembledPanel {
    pub rows: Vec<PanelRow>,
    pub summary: AssemblySummary,
    pub shape: PanelShape,
}

// ============================================================================
// PANEL ASSEMBLER
// ============================================================================

pub struct PanelAssembler {
    join: JoinType,
}

impl PanelAssembler {
    pub fn new(join: JoinType) -> Self {
        PanelAssembler { join }
    }

    pub fn assemble(
        &self,
        lobbying: &[LobbyingObservation],
        financials: &[FinancialObservation],
    ) -> AssembledPanel {
        let spend: HashMap<(&FirmKey, i32), Money> =
            lobbying.iter().map(|o| ((&o.firm, o.year), o.spend)).collect();
        let financial_keys: BTreeSet<(&FirmKey, i32)> =
            financials.iter().map(|f| (&f.firm, f.year)).collect();

        let mut rows = Vec::new();
        let mut financial_without_lobbying = 0;

        for fin in financials {
            let current = spend.get(&(&fin.firm, fin.year)).copied();
            if current.is_none() {
                financial_without_lobbying += 1;
                if self.join == JoinType::Inner {
                    continue;
                }
            }
            rows.push(PanelRow {
                firm_key: fin.firm.clone(),
                year: fin.year,
                lobbying_spend: current,
                lagged_lobbying_spend: spend.get(&(&fin.firm, fin.year - 1)).copied(),
                revenue: fin.revenue,
                net_income: fin.net_income,
                assets: fin.assets,
                industry: fin.industry.clone(),
            });
        }

        let lobbying_without_financials = lobbying
            .iter()
            .filter(|o| !financial_keys.contains(&(&o.firm, o.year)))
            .count();

        rows.sort_by(|a, b| a.firm_key.cmp(&b.firm_key).then(a.year.cmp(&b.year)));

        let summary = AssemblySummary {
            join: self.join,
            rows: rows.len(),
            financial_without_lobbying,
            lobbying_without_financials,
            rows_with_lag: rows.iter().filter(|r| r.lagged_lobbying_spend.is_some()).count(),
        };
        let shape = PanelShape::of(&rows);

        info!(
            join = %self.join,
            rows = summary.rows,
            firms = shape.firms,
            balanced = shape.balanced,
            financial_without_lobbying,
            lobbying_without_financials,
            "panel assembled"
        );

        AssembledPanel {
            rows,
            summary,
            shape,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Provenance;

    fn lobbying(firm: &str, year: i32, dollars: i64) -> LobbyingObservation {
        LobbyingObservation {
            firm: FirmKey::new(firm),
            year,
            spend: Money::from_dollars(dollars),
            filing_count: 1,
        }
    }

    fn financial(firm: &str, year: i32) -> FinancialObservation {
        FinancialObservation {
            firm: FirmKey::new(firm),
            year,
            revenue: Some(100.0),
            net_income: Some(10.0),
            assets: Some(500.0),
            industry: Some("3571".to_string()),
            provenance: Provenance::new("financials.csv", 2),
        }
    }

    #[test]
    fn test_inner_join_drops_firm_year_without_lobbying() {
        let lob = vec![lobbying("F", 2020, 10)];
        let fin = vec![financial("F", 2021)];

        let panel = PanelAssembler::new(JoinType::Inner).assemble(&lob, &fin);

        assert!(panel.rows.is_empty());
        assert_eq!(panel.summary.financial_without_lobbying, 1);
        assert_eq!(panel.summary.lobbying_without_financials, 1);
    }

    #[test]
    fn test_left_join_keeps_firm_year_with_missing_lobbying() {
        let lob = vec![lobbying("F", 2020, 10)];
        let fin = vec![financial("F", 2021)];

        let panel = PanelAssembler::new(JoinType::LeftOnFinancial).assemble(&lob, &fin);

        assert_eq!(panel.rows.len(), 1);
        let row = &panel.rows[0];
        assert_eq!(row.lobbying_spend, None);
        // Lag still comes from the lobbying stream
        assert_eq!(row.lagged_lobbying_spend, Some(Money::from_dollars(10)));
        assert_eq!(row.revenue, Some(100.0));
    }

    #[test]
    fn test_lag_missing_without_prior_year() {
        let lob = vec![lobbying("F", 2021, 80_000)];
        let fin = vec![financial("F", 2021)];

        let panel = PanelAssembler::new(JoinType::Inner).assemble(&lob, &fin);

        assert_eq!(panel.rows.len(), 1);
        assert_eq!(panel.rows[0].lobbying_spend, Some(Money::from_dollars(80_000)));
        assert_eq!(panel.rows[0].lagged_lobbying_spend, None);
    }

    #[test]
    fn test_lag_uses_previous_year() {
        let lob = vec![lobbying("F", 2020, 5), lobbying("F", 2021, 7)];
        let fin = vec![financial("F", 2021), financial("F", 2020)];

        let panel = PanelAssembler::new(JoinType::Inner).assemble(&lob, &fin);

        assert_eq!(panel.rows.len(), 2);
        assert_eq!(panel.rows[0].year, 2020);
        assert_eq!(panel.rows[0].lagged_lobbying_spend, None);
        assert_eq!(panel.rows[1].lagged_lobbying_spend, Some(Money::from_dollars(5)));
        assert_eq!(panel.summary.rows_with_lag, 1);
    }

    #[test]
    fn test_rows_sorted_by_firm_then_year() {
        let lob = vec![lobbying("B", 2021, 1), lobbying("A", 2022, 1), lobbying("A", 2021, 1)];
        let fin = vec![financial("B", 2021), financial("A", 2022), financial("A", 2021)];

        let panel = PanelAssembler::new(JoinType::Inner).assemble(&lob, &fin);
        let keys: Vec<(&str, i32)> =
            panel.rows.iter().map(|r| (r.firm_key.as_str(), r.year)).collect();

        assert_eq!(keys, vec![("A", 2021), ("A", 2022), ("B", 2021)]);
    }

    #[test]
    fn test_shape_detects_gaps_and_imbalance() {
        let fin = vec![
            financial("A", 2019),
            financial("A", 2021),
            financial("B", 2019),
            financial("B", 2020),
            financial("B", 2021),
        ];

        let panel = PanelAssembler::new(JoinType::LeftOnFinancial).assemble(&[], &fin);

        assert_eq!(panel.shape.firms, 2);
        assert_eq!(panel.shape.years, 3);
        assert_eq!(panel.shape.min_year, Some(2019));
        assert_eq!(panel.shape.max_year, Some(2021));
        assert!(!panel.shape.balanced);
        assert_eq!(panel.shape.firms_with_gaps, vec![FirmKey::new("A")]);
    }

    #[test]
    fn test_join_type_parsing() {
        assert_eq!("inner".parse::<JoinType>().unwrap(), JoinType::Inner);
        assert_eq!("Left-On-Financial".parse::<JoinType>().unwrap(), JoinType::LeftOnFinancial);
        assert!("outer".parse::<JoinType>().is_err());
        assert_eq!(JoinType::LeftOnFinancial.to_string(), "left-on-financial");
    }
}
