// 🔑 Identifier Resolver
// Raw identifier → canonical firm key, or a failure routed to the unresolved ledger.
//
// Order (first hit wins):
//   1. Exact        scoped variant, then shared variant
//   2. Canonical    the identifier already is a canonical key (identity_keys)
//   3. NormalizedName  exact match after name normalization (name_fallback)
//   4. Fuzzy        best Levenshtein similarity ≥ threshold (fuzzy_threshold)
//
// Nothing is guessed: ties and multi-key matches are Ambiguous.

use crate::config::ResolutionConfig;
use crate::entities::firm::{normalize_firm_name, similarity, Crosswalk};
use crate::model::{FirmKey, Provenance, SourceStream};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

// ============================================================================
// RESOLUTION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum MatchMethod {
    Exact,
    Canonical,
    NormalizedName,
    Fuzzy { score: f64 },
}

impl MatchMethod {
    pub fn code(&self) -> &'static str {
        match self {
            MatchMethod::Exact => "exact",
            MatchMethod::Canonical => "canonical",
            MatchMethod::NormalizedName => "normalized_name",
            MatchMethod::Fuzzy { .. } => "fuzzy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolved {
    pub key: FirmKey,
    pub method: MatchMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ResolutionFailure {
    /// Identifier cell was empty
    Blank,
    /// Not in the crosswalk under any enabled method
    Unknown,
    /// More than one canonical key matched
    Ambiguous { candidates: Vec<FirmKey> },
}

impl ResolutionFailure {
    pub fn code(&self) -> &'static str {
        match self {
            ResolutionFailure::Blank => "blank",
            ResolutionFailure::Unknown => "unknown",
            ResolutionFailure::Ambiguous { .. } => "ambiguous",
        }
    }
}

// ============================================================================
// IDENTIFIER RESOLVER
// ============================================================================

/// Resolves identifiers against one immutable crosswalk snapshot
pub struct IdentifierResolver<'a> {
    crosswalk: &'a Crosswalk,
    identity_keys: bool,
    name_fallback: bool,
    fuzzy_threshold: Option<f64>,
}

impl<'a> IdentifierResolver<'a> {
    pub fn new(crosswalk: &'a Crosswalk, config: &ResolutionConfig) -> Self {
        IdentifierResolver {
            crosswalk,
            identity_keys: config.identity_keys,
            name_fallback: config.name_fallback,
            fuzzy_threshold: config.fuzzy_threshold,
        }
    }

    /// Exact lookups only
    pub fn strict(crosswalk: &'a Crosswalk) -> Self {
        IdentifierResolver {
            crosswalk,
            identity_keys: true,
            name_fallback: false,
            fuzzy_threshold: None,
        }
    }

    pub fn crosswalk(&self) -> &Crosswalk {
        self.crosswalk
    }

    pub fn resolve(&self, stream: SourceStream, raw: &str) -> Result<Resolved, ResolutionFailure> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ResolutionFailure::Blank);
        }

        if let Some(key) = self.crosswalk.lookup(stream, raw) {
            return Ok(Resolved {
                key: key.clone(),
                method: MatchMethod::Exact,
            });
        }

        if self.identity_keys {
            if let Some(key) = self.crosswalk.canonical(raw) {
                return Ok(Resolved {
                    key: key.clone(),
                    method: MatchMethod::Canonical,
                });
            }
        }

        if !self.name_fallback && self.fuzzy_threshold.is_none() {
            return Err(ResolutionFailure::Unknown);
        }

        let normalized = normalize_firm_name(raw);
        if normalized.is_empty() {
            return Err(ResolutionFailure::Unknown);
        }

        if self.name_fallback {
            if let Some(candidates) = self.crosswalk.by_normalized_name(stream, &normalized) {
                if candidates.len() == 1 {
                    let key = candidates.iter().next().cloned().ok_or(ResolutionFailure::Unknown)?;
                    debug!(stream = %stream, raw, key = %key, "resolved by normalized name");
                    return Ok(Resolved {
                        key,
                        method: MatchMethod::NormalizedName,
                    });
                }
                return Err(ResolutionFailure::Ambiguous {
                    candidates: candidates.iter().cloned().collect(),
                });
            }
        }

        match self.fuzzy_threshold {
            Some(threshold) => self.resolve_fuzzy(stream, raw, &normalized, threshold),
            None => Err(ResolutionFailure::Unknown),
        }
    }

    fn resolve_fuzzy(
        &self,
        stream: SourceStream,
        raw: &str,
        normalized: &str,
        threshold: f64,
    ) -> Result<Resolved, ResolutionFailure> {
        let mut best_score = 0.0_f64;
        let mut best: Vec<FirmKey> = Vec::new();

        for (name, keys) in self.crosswalk.normalized_names(stream) {
            let score = similarity(normalized, name);
            if score < threshold {
                continue;
            }
            if score > best_score + f64::EPSILON {
                best_score = score;
                best = keys.iter().cloned().collect();
            } else if (score - best_score).abs() <= f64::EPSILON {
                best.extend(keys.iter().cloned());
            }
        }

        best.sort();
        best.dedup();

        match best.len() {
            0 => Err(ResolutionFailure::Unknown),
            1 => {
                let key = best.remove(0);
                warn!(
                    stream = %stream,
                    raw,
                    key = %key,
                    score = best_score,
                    threshold,
                    "fuzzy identifier match"
                );
                Ok(Resolved {
                    key,
                    method: MatchMethod::Fuzzy { score: best_score },
                })
            }
            _ => Err(ResolutionFailure::Ambiguous { candidates: best }),
        }
    }
}

// ============================================================================
// UNRESOLVED LEDGER (side channel)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnresolvedRecord {
    pub stream: SourceStream,
    pub raw_id: String,
    pub file: String,
    pub line: usize,
    #[serde(flatten)]
    pub failure: ResolutionFailure,
}

/// Every record that could not be resolved. Nothing leaves the pipeline silently.
#[derive(Debug, Clone, Default)]
pub struct UnresolvedLedger {
    records: Vec<UnresolvedRecord>,
}

impl UnresolvedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quarantine(
        &mut self,
        stream: SourceStream,
        raw_id: &str,
        provenance: &Provenance,
        failure: ResolutionFailure,
    ) {
        debug!(
            stream = %stream,
            raw_id,
            at = %provenance,
            reason = failure.code(),
            "identifier quarantined"
        );
        self.records.push(UnresolvedRecord {
            stream,
            raw_id: raw_id.trim().to_string(),
            file: provenance.file.clone(),
            line: provenance.line,
            failure,
        });
    }

    pub fn records(&self) -> &[UnresolvedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn count_for(&self, stream: SourceStream) -> usize {
        self.records.iter().filter(|r| r.stream == stream).count()
    }

    pub fn summary(&self, sample_limit: usize) -> UnresolvedSummary {
        let mut by_stream: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
        let mut distinct: BTreeMap<String, std::collections::BTreeSet<&str>> = BTreeMap::new();

        for record in &self.records {
            *by_stream
                .entry(record.stream.code().to_string())
                .or_default()
                .entry(record.failure.code().to_string())
                .or_default() += 1;
            distinct
                .entry(record.stream.code().to_string())
                .or_default()
                .insert(record.raw_id.as_str());
        }

        UnresolvedSummary {
            total: self.records.len(),
            by_stream,
            distinct_identifiers: distinct.into_iter().map(|(k, v)| (k, v.len())).collect(),
            samples: self.records.iter().take(sample_limit).cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnresolvedSummary {
    pub total: usize,
    /// stream → reason → record count
    pub by_stream: BTreeMap<String, BTreeMap<String, usize>>,
    /// stream → number of distinct unresolved identifiers
    pub distinct_identifiers: BTreeMap<String, usize>,
    pub samples: Vec<UnresolvedRecord>,
}

// ============================================================================
// RESOLUTION AUDIT
// ============================================================================

/// How every resolved record was matched: stream → method → count
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResolutionAudit {
    counts: BTreeMap<String, BTreeMap<String, usize>>,
}

impl ResolutionAudit {
    pub fn record(&mut self, stream: SourceStream, method: &MatchMethod) {
        *self
            .counts
            .entry(stream.code().to_string())
            .or_default()
            .entry(method.code().to_string())
            .or_default() += 1;
    }

    pub fn count(&self, stream: SourceStream, method: &str) -> usize {
        self.counts
            .get(stream.code())
            .and_then(|m| m.get(method))
            .copied()
            .unwrap_or(0)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::CrosswalkRow;

    fn crosswalk() -> Crosswalk {
        let rows: Vec<CrosswalkRow> = [
            ("17", "001690", "lobbying"),
            ("Apple Inc", "001690", "lobbying"),
            ("Boeing Co", "002285", "lobbying"),
            ("Acme Corp", "100", "lobbying"),
            ("ACME Inc", "200", "lobbying"),
            ("001690", "001690", "financial"),
        ]
        .iter()
        .enumerate()
        .map(|(i, (v, c, s))| CrosswalkRow {
            variant: v.to_string(),
            canonical: c.to_string(),
            scope: s.to_string(),
            provenance: Provenance::new("clients.csv", i + 2),
        })
        .collect();
        Crosswalk::build(&rows).unwrap()
    }

    fn config(name_fallback: bool, fuzzy: Option<f64>) -> ResolutionConfig {
        ResolutionConfig {
            identity_keys: true,
            name_fallback,
            fuzzy_threshold: fuzzy,
        }
    }

    #[test]
    fn test_exact_match() {
        let cw = crosswalk();
        let resolver = IdentifierResolver::strict(&cw);

        let resolved = resolver.resolve(SourceStream::Lobbying, " 17 ").unwrap();
        assert_eq!(resolved.key, FirmKey::new("001690"));
        assert_eq!(resolved.method, MatchMethod::Exact);
    }

    #[test]
    fn test_unknown_and_blank() {
        let cw = crosswalk();
        let resolver = IdentifierResolver::strict(&cw);

        assert_eq!(resolver.resolve(SourceStream::Lobbying, "99"), Err(ResolutionFailure::Unknown));
        assert_eq!(resolver.resolve(SourceStream::Lobbying, "  "), Err(ResolutionFailure::Blank));
    }

    #[test]
    fn test_scope_is_respected() {
        let cw = crosswalk();
        let resolver = IdentifierResolver::new(&cw, &config(false, None));

        // "17" is a lobbying-side variant only; on the financial side it is unknown
        assert_eq!(
            resolver.resolve(SourceStream::Financial, "17"),
            Err(ResolutionFailure::Unknown)
        );
    }

    #[test]
    fn test_canonical_identity() {
        let cw = crosswalk();
        let resolver = IdentifierResolver::new(&cw, &config(false, None));

        let resolved = resolver.resolve(SourceStream::Lobbying, "002285").unwrap();
        assert_eq!(resolved.key, FirmKey::new("002285"));
        assert_eq!(resolved.method, MatchMethod::Canonical);

        let off = ResolutionConfig {
            identity_keys: false,
            ..config(false, None)
        };
        let resolver = IdentifierResolver::new(&cw, &off);
        assert_eq!(
            resolver.resolve(SourceStream::Lobbying, "002285"),
            Err(ResolutionFailure::Unknown)
        );
    }

    #[test]
    fn test_name_fallback_disabled_by_default() {
        let cw = crosswalk();
        let resolver = IdentifierResolver::new(&cw, &ResolutionConfig::default());
        assert_eq!(
            resolver.resolve(SourceStream::Lobbying, "APPLE, INC."),
            Err(ResolutionFailure::Unknown)
        );
    }

    #[test]
    fn test_normalized_name_match() {
        let cw = crosswalk();
        let resolver = IdentifierResolver::new(&cw, &config(true, None));

        let resolved = resolver.resolve(SourceStream::Lobbying, "APPLE, INC.").unwrap();
        assert_eq!(resolved.key, FirmKey::new("001690"));
        assert_eq!(resolved.method, MatchMethod::NormalizedName);
    }

    #[test]
    fn test_normalized_name_ambiguous() {
        let cw = crosswalk();
        let resolver = IdentifierResolver::new(&cw, &config(true, None));

        match resolver.resolve(SourceStream::Lobbying, "acme") {
            Err(ResolutionFailure::Ambiguous { candidates }) => {
                assert_eq!(candidates, vec![FirmKey::new("100"), FirmKey::new("200")]);
            }
            other => panic!("expected ambiguous, got {:?}", other),
        }
    }

    #[test]
    fn test_fuzzy_match_above_threshold() {
        let cw = crosswalk();
        let resolver = IdentifierResolver::new(&cw, &config(true, Some(0.8)));

        // "boeng" vs "boeing": distance 1 over 6 chars
        let resolved = resolver.resolve(SourceStream::Lobbying, "Boeng Co").unwrap();
        assert_eq!(resolved.key, FirmKey::new("002285"));
        match resolved.method {
            MatchMethod::Fuzzy { score } => assert!(score >= 0.8 && score < 1.0),
            other => panic!("expected fuzzy, got {:?}", other),
        }
    }

    #[test]
    fn test_fuzzy_below_threshold_is_unknown() {
        let cw = crosswalk();
        let resolver = IdentifierResolver::new(&cw, &config(false, Some(0.95)));
        assert_eq!(
            resolver.resolve(SourceStream::Lobbying, "Boeng Co"),
            Err(ResolutionFailure::Unknown)
        );
    }

    #[test]
    fn test_fuzzy_tie_is_ambiguous() {
        let cw = crosswalk();
        let resolver = IdentifierResolver::new(&cw, &config(false, Some(0.7)));

        // "acmx" is equally close to the two "acme" variants → two keys
        match resolver.resolve(SourceStream::Lobbying, "Acmx") {
            Err(ResolutionFailure::Ambiguous { candidates }) => assert_eq!(candidates.len(), 2),
            other => panic!("expected ambiguous, got {:?}", other),
        }
    }

    #[test]
    fn test_ledger_summary_counts() {
        let mut ledger = UnresolvedLedger::new();
        let at = Provenance::new("reports.csv", 5);
        ledger.quarantine(SourceStream::Lobbying, "99", &at, ResolutionFailure::Unknown);
        ledger.quarantine(SourceStream::Lobbying, "99", &at, ResolutionFailure::Unknown);
        ledger.quarantine(SourceStream::Financial, "", &at, ResolutionFailure::Blank);

        let summary = ledger.summary(1);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_stream["lobbying"]["unknown"], 2);
        assert_eq!(summary.by_stream["financial"]["blank"], 1);
        assert_eq!(summary.distinct_identifiers["lobbying"], 1);
        assert_eq!(summary.samples.len(), 1);
        assert_eq!(ledger.count_for(SourceStream::Lobbying), 2);
    }

    #[test]
    fn test_audit_counts() {
        let mut audit = ResolutionAudit::default();
        audit.record(SourceStream::Lobbying, &MatchMethod::Exact);
        audit.record(SourceStream::Lobbying, &MatchMethod::Exact);
        audit.record(SourceStream::Financial, &MatchMethod::Canonical);

        assert_eq!(audit.count(SourceStream::Lobbying, "exact"), 2);
        assert_eq!(audit.count(SourceStream::Financial, "canonical"), 1);
        assert_eq!(audit.count(SourceStream::Financial, "fuzzy"), 0);
    }
}
