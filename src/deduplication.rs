// 🔍 Deduplication - one record per (firm key, year)
// Deterministic tie-break: the first-seen record wins, every later claim is
// logged and recorded. Never a silent overwrite.

use crate::model::{FirmKey, Provenance, SourceStream};
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

// ============================================================================
// DUPLICATE RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateRecord {
    pub stream: SourceStream,
    pub firm: FirmKey,
    pub year: i32,
    /// Record that was retained
    pub kept: Provenance,
    /// Record that was dropped
    pub dropped: Provenance,
}

// ============================================================================
// FIRM-YEAR DEDUPLICATOR
// ============================================================================

pub struct FirmYearDeduplicator {
    stream: SourceStream,
    seen: HashMap<(FirmKey, i32), Provenance>,
    duplicates: Vec<DuplicateRecord>,
}

impl FirmYearDeduplicator {
    pub fn new(stream: SourceStream) -> Self {
        FirmYearDeduplicator {
            stream,
            seen: HashMap::new(),
            duplicates: Vec::new(),
        }
    }

    /// Returns true when this is the first claim on (firm, year)
    pub fn admit(&mut self, firm: &FirmKey, year: i32, provenance: &Provenance) -> bool {
        match self.seen.get(&(firm.clone(), year)) {
            Some(kept) => {
                warn!(
                    stream = %self.stream,
                    firm = %firm,
                    year,
                    kept = %kept,
                    dropped = %provenance,
                    "duplicate firm-year; keeping first-seen record"
                );
                self.duplicates.push(DuplicateRecord {
                    stream: self.stream,
                    firm: firm.clone(),
                    year,
                    kept: kept.clone(),
                    dropped: provenance.clone(),
                });
                false
            }
            None => {
                self.seen.insert((firm.clone(), year), provenance.clone());
                true
            }
        }
    }

    pub fn duplicates(&self) -> &[DuplicateRecord] {
        &self.duplicates
    }

    pub fn into_duplicates(self) -> Vec<DuplicateRecord> {
        self.duplicates
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_seen_wins() {
        let mut dedup = FirmYearDeduplicator::new(SourceStream::Financial);
        let firm = FirmKey::new("001690");

        assert!(dedup.admit(&firm, 2021, &Provenance::new("fin.csv", 2)));
        assert!(!dedup.admit(&firm, 2021, &Provenance::new("fin.csv", 7)));

        let duplicates = dedup.duplicates();
        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates[0].kept.line, 2);
        assert_eq!(duplicates[0].dropped.line, 7);
        assert_eq!(duplicates[0].stream, SourceStream::Financial);
    }

    #[test]
    fn test_different_years_are_not_duplicates() {
        let mut dedup = FirmYearDeduplicator::new(SourceStream::Financial);
        let firm = FirmKey::new("001690");

        assert!(dedup.admit(&firm, 2020, &Provenance::new("fin.csv", 2)));
        assert!(dedup.admit(&firm, 2021, &Provenance::new("fin.csv", 3)));
        assert!(dedup.admit(&FirmKey::new("002285"), 2021, &Provenance::new("fin.csv", 4)));
        assert!(dedup.into_duplicates().is_empty());
    }

    #[test]
    fn test_third_claim_still_points_at_first() {
        let mut dedup = FirmYearDeduplicator::new(SourceStream::Financial);
        let firm = FirmKey::new("001690");

        dedup.admit(&firm, 2021, &Provenance::new("fin.csv", 2));
        dedup.admit(&firm, 2021, &Provenance::new("fin.csv", 3));
        dedup.admit(&firm, 2021, &Provenance::new("fin.csv", 4));

        let duplicates = dedup.into_duplicates();
        assert_eq!(duplicates.len(), 2);
        assert!(duplicates.iter().all(|d| d.kept.line == 2));
    }
}
