// 🧹 Filing Normalizer
//
// standardize: raw rows → typed filings, amendments / no-activity dropped
// resolve:     client id → canonical firm key (unresolved → ledger)
// aggregate:   sum original filings per (firm key, year)
//
// Amendments never replace originals here: they are excluded outright.
// A firm-year with no surviving filing emits nothing (missing, not zero).

use crate::error::{PipelineError, Result};
use crate::model::{
    Filing, FilingType, FilingTypeCell, FirmKey, LobbyingObservation, Money, RawFiling,
    SourceStream,
};
use crate::resolver::{IdentifierResolver, ResolutionAudit, UnresolvedLedger};
use chrono::{Datelike, NaiveDate};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 2100;

// ============================================================================
// STATS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizationStats {
    pub total_filings: usize,
    pub amendments_excluded: usize,
    pub no_activity_excluded: usize,
    /// Original filings with a blank amount (quarantined, not treated as zero)
    pub missing_amount: usize,
    pub originals_kept: usize,
    pub unresolved: usize,
    pub observations: usize,
}

/// Original filing attached to its canonical firm
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFiling {
    pub firm: FirmKey,
    pub filing: Filing,
}

#[derive(Debug, Clone)]
pub struct NormalizedFilings {
    pub observations: Vec<LobbyingObservation>,
    pub stats: NormalizationStats,
}

// ============================================================================
// FILING NORMALIZER
// ============================================================================

pub struct FilingNormalizer {
    parallel: bool,
}

impl FilingNormalizer {
    pub fn new(parallel: bool) -> Self {
        FilingNormalizer { parallel }
    }

    /// Run all three passes
    pub fn normalize(
        &self,
        raw: &[RawFiling],
        resolver: &IdentifierResolver,
        ledger: &mut UnresolvedLedger,
        audit: &mut ResolutionAudit,
    ) -> Result<NormalizedFilings> {
        let (originals, mut stats) = self.standardize(raw)?;
        let resolved = self.resolve(originals, resolver, ledger, audit, &mut stats);
        let observations = self.aggregate(resolved)?;
        stats.observations = observations.len();

        info!(
            filings = stats.total_filings,
            amendments = stats.amendments_excluded,
            no_activity = stats.no_activity_excluded,
            missing_amount = stats.missing_amount,
            unresolved = stats.unresolved,
            observations = stats.observations,
            "filings normalized"
        );

        Ok(NormalizedFilings { observations, stats })
    }

    /// Type every row and keep only original filings with an amount.
    ///
    /// Any unparseable period, amount or filing type rejects the whole file.
    pub fn standardize(&self, raw: &[RawFiling]) -> Result<(Vec<Filing>, NormalizationStats)> {
        let mut stats = NormalizationStats {
            total_filings: raw.len(),
            ..Default::default()
        };
        let mut originals = Vec::new();

        for row in raw {
            let at = &row.provenance;
            let filing = standardize_filing(row)
                .map_err(|detail| PipelineError::schema(&at.file, at.line, detail))?;

            match filing.filing_type {
                FilingType::Amendment => stats.amendments_excluded += 1,
                FilingType::NoActivity => stats.no_activity_excluded += 1,
                FilingType::Original if filing.amount.is_none() => stats.missing_amount += 1,
                FilingType::Original => originals.push(filing),
            }
        }

        if stats.missing_amount > 0 {
            warn!(
                count = stats.missing_amount,
                "original filings with a blank amount were quarantined"
            );
        }
        stats.originals_kept = originals.len();

        Ok((originals, stats))
    }

    /// Attach canonical keys; unresolved filings go to the ledger
    pub fn resolve(
        &self,
        filings: Vec<Filing>,
        resolver: &IdentifierResolver,
        ledger: &mut UnresolvedLedger,
        audit: &mut ResolutionAudit,
        stats: &mut NormalizationStats,
    ) -> Vec<ResolvedFiling> {
        let mut resolved = Vec::with_capacity(filings.len());

        for filing in filings {
            match resolver.resolve(SourceStream::Lobbying, &filing.client_id) {
                Ok(hit) => {
                    audit.record(SourceStream::Lobbying, &hit.method);
                    resolved.push(ResolvedFiling {
                        firm: hit.key,
                        filing,
                    });
                }
                Err(failure) => {
                    stats.unresolved += 1;
                    ledger.quarantine(
                        SourceStream::Lobbying,
                        &filing.client_id,
                        &filing.provenance,
                        failure,
                    );
                }
            }
        }

        resolved
    }

    /// Group by firm, sum per year, emit sorted by (firm key, year).
    ///
    /// Firms are independent, so they may be aggregated in parallel; the final
    /// sort makes the output order independent of scheduling. A firm-year whose
    /// total leaves `i64` cents is a schema violation at the filing that tipped it.
    pub fn aggregate(&self, resolved: Vec<ResolvedFiling>) -> Result<Vec<LobbyingObservation>> {
        let mut by_firm: BTreeMap<FirmKey, Vec<ResolvedFiling>> = BTreeMap::new();
        for filing in resolved {
            by_firm.entry(filing.firm.clone()).or_default().push(filing);
        }
        let groups: Vec<(FirmKey, Vec<ResolvedFiling>)> = by_firm.into_iter().collect();

        let per_firm: Vec<Vec<LobbyingObservation>> = if self.parallel {
            groups
                .par_iter()
                .map(|(firm, filings)| aggregate_firm(firm, filings))
                .collect::<Result<_>>()?
        } else {
            groups
                .iter()
                .map(|(firm, filings)| aggregate_firm(firm, filings))
                .collect::<Result<_>>()?
        };

        let mut observations: Vec<LobbyingObservation> = per_firm.into_iter().flatten().collect();
        observations.sort_by(|a, b| a.firm.cmp(&b.firm).then(a.year.cmp(&b.year)));
        Ok(observations)
    }
}

/// One firm's filings → at most one observation per year
pub fn aggregate_firm(
    firm: &FirmKey,
    filings: &[ResolvedFiling],
) -> Result<Vec<LobbyingObservation>> {
    let mut by_year: BTreeMap<i32, (Money, usize)> = BTreeMap::new();

    for resolved in filings.iter().filter(|r| &r.firm == firm) {
        let filing = &resolved.filing;
        if filing.filing_type != FilingType::Original {
            continue;
        }
        let Some(amount) = filing.amount else {
            continue;
        };

        let (total, count) = by_year.entry(filing.year).or_default();
        *total = total.checked_add(amount).ok_or_else(|| {
            PipelineError::schema(
                &filing.provenance.file,
                filing.provenance.line,
                format!(
                    "amount: {} spend for {} overflows at {}",
                    filing.year,
                    firm.as_str(),
                    amount
                ),
            )
        })?;
        *count += 1;
    }

    Ok(by_year
        .into_iter()
        .map(|(year, (spend, filing_count))| LobbyingObservation {
            firm: firm.clone(),
            year,
            spend,
            filing_count,
        })
        .collect())
}

// ============================================================================
// CELL PARSERS
// ============================================================================

pub fn standardize_filing(row: &RawFiling) -> std::result::Result<Filing, String> {
    let filing_type = parse_filing_type(&row.filing_type)?;
    let year = parse_period_year(&row.period)?;
    let amount = Money::parse(&row.amount).map_err(|e| format!("amount: {}", e))?;

    Ok(Filing {
        client_id: row.client_id.trim().to_string(),
        period: row.period.trim().to_string(),
        year,
        amount,
        filing_type,
        provenance: row.provenance.clone(),
    })
}

pub fn parse_filing_type(cell: &FilingTypeCell) -> std::result::Result<FilingType, String> {
    match cell {
        FilingTypeCell::Column(value) => {
            let lowered = value.trim().to_lowercase();
            match lowered.as_str() {
                "original" | "orig" | "o" => Ok(FilingType::Original),
                "amendment" | "amended" | "a" => Ok(FilingType::Amendment),
                "no-activity" | "no_activity" | "noactivity" | "no activity" | "n" => {
                    Ok(FilingType::NoActivity)
                }
                _ => Err(format!("unrecognised filing type '{}'", value)),
            }
        }
        FilingTypeCell::Flags {
            amendment,
            no_activity,
        } => {
            let is_amendment = parse_flag(amendment).map_err(|e| format!("amendment flag: {}", e))?;
            let is_no_activity =
                parse_flag(no_activity).map_err(|e| format!("no-activity flag: {}", e))?;
            Ok(if is_no_activity {
                FilingType::NoActivity
            } else if is_amendment {
                FilingType::Amendment
            } else {
                FilingType::Original
            })
        }
    }
}

pub fn parse_flag(value: &str) -> std::result::Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "true" | "t" | "1" | "1.0" | "yes" | "y" => Ok(true),
        "false" | "f" | "0" | "0.0" | "no" | "n" => Ok(false),
        _ => Err(format!("not a boolean: '{}'", value)),
    }
}

/// Reporting period → calendar year
///
/// `2021`, `2021.0`, `2021-Q3`, `2021Q3`, `Q3 2021`, `2021-H1`, `2021-06-30`, `06/30/2021`
pub fn parse_period_year(period: &str) -> std::result::Result<i32, String> {
    let text = period.trim();
    if text.is_empty() {
        return Err("reporting period is blank".to_string());
    }

    let year = bare_year(text)
        .or_else(|| year_then_part(text))
        .or_else(|| part_then_year(text))
        .or_else(|| date_year(text))
        .ok_or_else(|| format!("unrecognised reporting period '{}'", period))?;

    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(format!("reporting year {} out of range", year));
    }
    Ok(year)
}

/// Integer year (spreadsheets export `2021` as `2021.0`)
pub fn parse_year(text: &str) -> std::result::Result<i32, String> {
    let trimmed = text.trim();
    let year = bare_year(trimmed).ok_or_else(|| format!("not a year: '{}'", text))?;
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(format!("year {} out of range", year));
    }
    Ok(year)
}

fn bare_year(text: &str) -> Option<i32> {
    let digits = text.strip_suffix(".0").unwrap_or(text);
    if digits.len() == 4 && digits.chars().all(|c| c.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

fn is_half_or_quarter(part: &str) -> bool {
    let part = part.to_lowercase();
    let mut chars = part.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (Some('q'), Some(d), None) => ('1'..='4').contains(&d),
        (Some('h'), Some(d), None) => ('1'..='2').contains(&d),
        _ => false,
    }
}

fn year_then_part(text: &str) -> Option<i32> {
    if text.len() < 6 || !text.is_char_boundary(4) {
        return None;
    }
    let (year, rest) = text.split_at(4);
    let rest = rest.trim_start_matches(|c| matches!(c, '-' | '/' | '_' | ' '));
    if is_half_or_quarter(rest) {
        bare_year(year)
    } else {
        None
    }
}

fn part_then_year(text: &str) -> Option<i32> {
    let parts: Vec<&str> = text
        .split(|c| matches!(c, '-' | '/' | '_' | ' '))
        .filter(|p| !p.is_empty())
        .collect();
    match parts.as_slice() {
        [part, year] if is_half_or_quarter(part) => bare_year(year),
        _ => None,
    }
}

fn date_year(text: &str) -> Option<i32> {
    // Timestamps: keep the date part
    let date_part = text.split(|c| c == 'T' || c == ' ').next().unwrap_or(text);
    ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
        .map(|date| date.year())
}

// ============================================================================
// TESTS
// ============================================================================
