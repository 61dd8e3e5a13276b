// 📒 Financial Record Loader
// Raw statement rows → FinancialObservation, resolved against the same crosswalk
// as the filings. One observation per (firm key, year): first-seen wins.

use crate::deduplication::{DuplicateRecord, FirmYearDeduplicator};
use crate::error::{PipelineError, Result};
use crate::model::{parse_figure, FinancialObservation, RawFinancial, SourceStream};
use crate::normalizer::parse_year;
use crate::resolver::{IdentifierResolver, ResolutionAudit, UnresolvedLedger};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FinancialStats {
    pub total_rows: usize,
    pub unresolved: usize,
    pub duplicates: usize,
    pub observations: usize,
}

#[derive(Debug, Clone)]
pub struct LoadedFinancials {
    pub observations: Vec<FinancialObservation>,
    pub duplicates: Vec<DuplicateRecord>,
    pub stats: FinancialStats,
}

pub struct FinancialLoader;

impl FinancialLoader {
    pub fn new() -> Self {
        FinancialLoader
    }

    /// Type, resolve and deduplicate. Observations keep source order.
    pub fn load(
        &self,
        raw: &[RawFinancial],
        resolver: &IdentifierResolver,
        ledger: &mut UnresolvedLedger,
        audit: &mut ResolutionAudit,
    ) -> Result<LoadedFinancials> {
        let mut stats = FinancialStats {
            total_rows: raw.len(),
            ..Default::default()
        };

        // Parse everything first: one bad cell rejects the file before any resolution
        let mut typed = Vec::with_capacity(raw.len());
        for row in raw {
            let at = &row.provenance;
            let parsed = parse_row(row)
                .map_err(|detail| PipelineError::schema(&at.file, at.line, detail))?;
            typed.push((row, parsed));
        }

        let mut dedup = FirmYearDeduplicator::new(SourceStream::Financial);
        let mut observations = Vec::new();

        for (row, figures) in typed {
            let resolved = match resolver.resolve(SourceStream::Financial, &row.firm_id) {
                Ok(hit) => hit,
                Err(failure) => {
                    stats.unresolved += 1;
                    ledger.quarantine(
                        SourceStream::Financial,
                        &row.firm_id,
                        &row.provenance,
                        failure,
                    );
                    continue;
                }
            };
            audit.record(SourceStream::Financial, &resolved.method);

            if !dedup.admit(&resolved.key, figures.year, &row.provenance) {
                continue;
            }

            observations.push(FinancialObservation {
                firm: resolved.key,
                year: figures.year,
                revenue: figures.revenue,
                net_income: figures.net_income,
                assets: figures.assets,
                industry: figures.industry,
                provenance: row.provenance.clone(),
            });
        }

        let duplicates = dedup.into_duplicates();
        stats.duplicates = duplicates.len();
        stats.observations = observations.len();

        info!(
            rows = stats.total_rows,
            unresolved = stats.unresolved,
            duplicates = stats.duplicates,
            observations = stats.observations,
            "financials loaded"
        );

        Ok(LoadedFinancials {
            observations,
            duplicates,
            stats,
        })
    }
}

impl Default for FinancialLoader {
    fn default() -> Self {
        Self::new()
    }
}

struct TypedFigures {
    year: i32,
    revenue: Option<f64>,
    net_income: Option<f64>,
    assets: Option<f64>,
    industry: Option<String>,
}

fn parse_row(row: &RawFinancial) -> std::result::Result<TypedFigures, String> {
    let industry = row.industry.trim();
    Ok(TypedFigures {
        year: parse_year(&row.year)?,
        revenue: parse_figure(&row.revenue).map_err(|e| format!("revenue: {}", e))?,
        net_income: parse_figure(&row.net_income).map_err(|e| format!("net income: {}", e))?,
        assets: parse_figure(&row.assets).map_err(|e| format!("assets: {}", e))?,
        industry: if industry.is_empty() {
            None
        } else {
            Some(industry.to_string())
        },
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Crosswalk;
    use crate::model::{FirmKey, Provenance};
    use crate::parser::CrosswalkRow;

    fn row(firm: &str, year: &str, revenue: &str, industry: &str, line: usize) -> RawFinancial {
        RawFinancial {
            firm_id: firm.to_string(),
            year: year.to_string(),
            revenue: revenue.to_string(),
            net_income: "-5".to_string(),
            assets: "1000".to_string(),
            industry: industry.to_string(),
            provenance: Provenance::new("financials.csv", line),
        }
    }

    fn crosswalk() -> Crosswalk {
        let rows = vec![
            CrosswalkRow {
                variant: "001690".to_string(),
                canonical: "001690".to_string(),
                scope: "financial".to_string(),
                provenance: Provenance::new("clients.csv", 2),
            },
            CrosswalkRow {
                variant: "1690".to_string(),
                canonical: "001690".to_string(),
                scope: "financial".to_string(),
                provenance: Provenance::new("clients.csv", 3),
            },
        ];
        Crosswalk::build(&rows).unwrap()
    }

    fn load(rows: &[RawFinancial]) -> Result<(LoadedFinancials, UnresolvedLedger)> {
        let cw = crosswalk();
        let resolver = IdentifierResolver::strict(&cw);
        let mut ledger = UnresolvedLedger::new();
        let mut audit = ResolutionAudit::default();
        let loaded = FinancialLoader::new().load(rows, &resolver, &mut ledger, &mut audit)?;
        Ok((loaded, ledger))
    }

    #[test]
    fn test_load_types_figures() {
        let (loaded, _) = load(&[row("001690", "2021", "$1,500.5", " 3571 ", 2)]).unwrap();

        assert_eq!(loaded.observations.len(), 1);
        let obs = &loaded.observations[0];
        assert_eq!(obs.firm, FirmKey::new("001690"));
        assert_eq!(obs.year, 2021);
        assert_eq!(obs.revenue, Some(1500.5));
        assert_eq!(obs.net_income, Some(-5.0));
        assert_eq!(obs.industry.as_deref(), Some("3571"));
    }

    #[test]
    fn test_blank_figures_are_missing() {
        let (loaded, _) = load(&[row("001690", "2021", "", "", 2)]).unwrap();
        assert_eq!(loaded.observations[0].revenue, None);
        assert_eq!(loaded.observations[0].industry, None);
    }

    #[test]
    fn test_duplicate_firm_year_first_seen_wins() {
        let (loaded, _) = load(&[
            row("001690", "2021", "100", "3571", 2),
            row("001690", "2021", "999", "3571", 3),
        ])
        .unwrap();

        assert_eq!(loaded.observations.len(), 1);
        assert_eq!(loaded.observations[0].revenue, Some(100.0));
        assert_eq!(loaded.duplicates.len(), 1);
        assert_eq!(loaded.duplicates[0].dropped.line, 3);
        assert_eq!(loaded.stats.duplicates, 1);
    }

    #[test]
    fn test_duplicate_detected_across_variants() {
        // Two identifier variants of one firm claiming the same year
        let (loaded, _) = load(&[
            row("001690", "2021", "100", "3571", 2),
            row("1690", "2021", "200", "3571", 3),
        ])
        .unwrap();

        assert_eq!(loaded.observations.len(), 1);
        assert_eq!(loaded.duplicates.len(), 1);
    }

    #[test]
    fn test_unresolved_rows_quarantined() {
        let (loaded, ledger) = load(&[row("999999", "2021", "1", "1", 2)]).unwrap();
        assert!(loaded.observations.is_empty());
        assert_eq!(loaded.stats.unresolved, 1);
        assert_eq!(ledger.count_for(SourceStream::Financial), 1);
    }

    #[test]
    fn test_bad_year_rejects_file() {
        match load(&[row("001690", "FY21", "1", "1", 4)]) {
            Err(PipelineError::Schema { line, .. }) => assert_eq!(line, 4),
            other => panic!("expected schema error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_non_numeric_figure_rejects_file() {
        assert!(matches!(
            load(&[row("001690", "2021", "n/a", "1", 2)]),
            Err(PipelineError::Schema { .. })
        ));
    }
}
