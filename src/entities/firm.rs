// 🏢 Firm identity - the crosswalk
//
// "A client name is a VALUE, the canonical key is IDENTITY."
//
// Problem solved:
// - LobbyView client ids, client names and Compustat gvkeys all name the same firm
// - Each variant maps to exactly one canonical key (many-to-one, never the reverse)
// - The crosswalk is built once per run and never mutated afterwards

use crate::error::{PipelineError, Result};
use crate::model::{FirmKey, SourceStream};
use crate::parser::CrosswalkRow;
use std::collections::{BTreeMap, BTreeSet, HashMap};

// ============================================================================
// CROSSWALK
// ============================================================================

/// Immutable identifier → canonical key snapshot
#[derive(Debug, Clone, Default)]
pub struct Crosswalk {
    /// Variants that apply to both streams
    shared: HashMap<String, FirmKey>,

    /// Variants scoped to one stream (take precedence over `shared`)
    scoped: HashMap<SourceStream, HashMap<String, FirmKey>>,

    /// Every canonical key the roster names
    canonical_keys: BTreeSet<FirmKey>,

    /// Normalized variant → candidate keys, per stream (BTreeMap for stable iteration)
    names: HashMap<SourceStream, BTreeMap<String, BTreeSet<FirmKey>>>,
}

impl Crosswalk {
    /// Build from roster rows.
    ///
    /// - blank variant or key → schema violation
    /// - one variant → two keys within one scope → crosswalk conflict
    /// - exact repeats are ignored
    pub fn build(rows: &[CrosswalkRow]) -> Result<Self> {
        let mut crosswalk = Crosswalk::default();

        for row in rows {
            let file = &row.provenance.file;
            let line = row.provenance.line;

            let variant = row.variant.trim();
            let canonical = row.canonical.trim();
            if variant.is_empty() || canonical.is_empty() {
                return Err(PipelineError::schema(
                    file,
                    line,
                    "crosswalk row has a blank variant or canonical key",
                ));
            }

            let scope = SourceStream::parse_scope(&row.scope)
                .map_err(|detail| PipelineError::schema(file, line, detail))?;
            let key = FirmKey::new(canonical);

            let table = match scope {
                Some(stream) => crosswalk.scoped.entry(stream).or_default(),
                None => &mut crosswalk.shared,
            };

            if let Some(existing) = table.get(variant) {
                if existing != &key {
                    return Err(PipelineError::CrosswalkConflict {
                        file: file.clone(),
                        line,
                        variant: variant.to_string(),
                        existing: existing.to_string(),
                        conflicting: key.to_string(),
                    });
                }
                continue;
            }
            table.insert(variant.to_string(), key.clone());

            let streams: &[SourceStream] = match scope {
                Some(SourceStream::Lobbying) => &[SourceStream::Lobbying],
                Some(SourceStream::Financial) => &[SourceStream::Financial],
                None => &[SourceStream::Lobbying, SourceStream::Financial],
            };
            let normalized = normalize_firm_name(variant);
            if !normalized.is_empty() {
                for stream in streams {
                    crosswalk
                        .names
                        .entry(*stream)
                        .or_default()
                        .entry(normalized.clone())
                        .or_default()
                        .insert(key.clone());
                }
            }

            crosswalk.canonical_keys.insert(key);
        }

        Ok(crosswalk)
    }

    /// Exact variant lookup: scoped first, then shared
    pub fn lookup(&self, stream: SourceStream, raw: &str) -> Option<&FirmKey> {
        let raw = raw.trim();
        self.scoped
            .get(&stream)
            .and_then(|table| table.get(raw))
            .or_else(|| self.shared.get(raw))
    }

    /// Is `raw` itself one of the roster's canonical keys?
    pub fn canonical(&self, raw: &str) -> Option<&FirmKey> {
        self.canonical_keys.get(&FirmKey::new(raw))
    }

    pub fn contains_key(&self, key: &FirmKey) -> bool {
        self.canonical_keys.contains(key)
    }

    /// Candidate keys for an exact normalized-name match
    pub fn by_normalized_name(
        &self,
        stream: SourceStream,
        normalized: &str,
    ) -> Option<&BTreeSet<FirmKey>> {
        self.names.get(&stream).and_then(|names| names.get(normalized))
    }

    /// All normalized names applicable to a stream, in sorted order
    pub fn normalized_names(
        &self,
        stream: SourceStream,
    ) -> impl Iterator<Item = (&String, &BTreeSet<FirmKey>)> {
        self.names.get(&stream).into_iter().flat_map(|names| names.iter())
    }

    pub fn canonical_keys(&self) -> &BTreeSet<FirmKey> {
        &self.canonical_keys
    }

    /// Number of variants (shared + scoped)
    pub fn variant_count(&self) -> usize {
        self.shared.len() + self.scoped.values().map(HashMap::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.variant_count() == 0
    }
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Corporate suffixes dropped from the end of a normalized name
const CORPORATE_SUFFIXES: [&str; 14] = [
    "inc",
    "incorporated",
    "corp",
    "corporation",
    "co",
    "company",
    "llc",
    "lp",
    "llp",
    "ltd",
    "limited",
    "plc",
    "holdings",
    "group",
];

/// Normalize a firm name for exact-after-normalization matching
///
/// - Lowercase
/// - `&` → `and`, other punctuation → space
/// - Collapse whitespace
/// - Drop trailing corporate suffixes ("Inc", "Corp.", "Holdings, Inc.")
///
/// "The Boeing Company" → "the boeing", "AT&T Inc." → "at and t"
pub fn normalize_firm_name(s: &str) -> String {
    let lowered = s.to_lowercase().replace('&', " and ");
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut words: Vec<&str> = cleaned.split_whitespace().collect();
    while words.len() > 1 {
        match words.last() {
            Some(last) if CORPORATE_SUFFIXES.contains(last) => {
                words.pop();
            }
            _ => break,
        }
    }

    words.join(" ")
}

/// Levenshtein distance over characters
///
/// Minimum number of single-character edits (insertions, deletions,
/// substitutions) to change one string into another
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let s1_chars: Vec<char> = s1.chars().collect();
    let s2_chars: Vec<char> = s2.chars().collect();
    let len1 = s1_chars.len();
    let len2 = s2_chars.len();

    if len1 == 0 {
        return len2;
    }
    if len2 == 0 {
        return len1;
    }

    let mut matrix = vec![vec![0; len2 + 1]; len1 + 1];

    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=len2 {
        matrix[0][j] = j;
    }

    for i in 1..=len1 {
        for j in 1..=len2 {
            let cost = if s1_chars[i - 1] == s2_chars[j - 1] { 0 } else { 1 };

            matrix[i][j] = std::cmp::min(
                std::cmp::min(
                    matrix[i - 1][j] + 1, // deletion
                    matrix[i][j - 1] + 1, // insertion
                ),
                matrix[i - 1][j - 1] + cost, // substitution
            );
        }
    }

    matrix[len1][len2]
}

/// Similarity in [0, 1]: 1 - distance / longer length
pub fn similarity(s1: &str, s2: &str) -> f64 {
    let longest = s1.chars().count().max(s2.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein_distance(s1, s2) as f64 / longest as f64
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Provenance;

    fn row(variant: &str, canonical: &str, scope: &str, line: usize) -> CrosswalkRow {
        CrosswalkRow {
            variant: variant.to_string(),
            canonical: canonical.to_string(),
            scope: scope.to_string(),
            provenance: Provenance::new("clients.csv", line),
        }
    }

    #[test]
    fn test_normalize_firm_name() {
        assert_eq!(normalize_firm_name("The Boeing Company"), "the boeing");
        assert_eq!(normalize_firm_name("AT&T Inc."), "at and t");
        assert_eq!(normalize_firm_name("Alphabet Holdings, Inc."), "alphabet");
        assert_eq!(normalize_firm_name("  EXXON   MOBIL CORP "), "exxon mobil");
        // A lone suffix word is kept rather than normalizing to nothing
        assert_eq!(normalize_firm_name("Group"), "group");
    }

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("", ""), 0);
        assert_eq!(levenshtein_distance("abc", "abc"), 0);
        assert_eq!(levenshtein_distance("abc", "ab"), 1);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("nestlé", "nestle"), 1);
    }

    #[test]
    fn test_similarity() {
        assert_eq!(similarity("boeing", "boeing"), 1.0);
        assert!((similarity("kitten", "sitting") - (1.0 - 3.0 / 7.0)).abs() < 1e-12);
        assert_eq!(similarity("", ""), 1.0);
    }

    #[test]
    fn test_build_and_lookup() {
        let crosswalk = Crosswalk::build(&[
            row("17", "001690", "", 2),
            row("APPLE INC", "001690", "", 3),
            row("42", "012141", "", 4),
        ])
        .unwrap();

        assert_eq!(crosswalk.lookup(SourceStream::Lobbying, "17"), Some(&FirmKey::new("001690")));
        assert_eq!(
            crosswalk.lookup(SourceStream::Financial, " 42 "),
            Some(&FirmKey::new("012141"))
        );
        assert_eq!(crosswalk.lookup(SourceStream::Lobbying, "99"), None);
        assert_eq!(crosswalk.canonical_keys().len(), 2);
        assert_eq!(crosswalk.variant_count(), 3);
        assert!(crosswalk.contains_key(&FirmKey::new("001690")));
    }

    #[test]
    fn test_scoped_variant_wins_over_shared() {
        // lob_id "1690" and gvkey "1690" must not collide
        let crosswalk = Crosswalk::build(&[
            row("1690", "001690", "lobbying", 2),
            row("1690", "999999", "financial", 3),
        ])
        .unwrap();

        assert_eq!(crosswalk.lookup(SourceStream::Lobbying, "1690"), Some(&FirmKey::new("001690")));
        assert_eq!(
            crosswalk.lookup(SourceStream::Financial, "1690"),
            Some(&FirmKey::new("999999"))
        );
    }

    #[test]
    fn test_conflicting_variant_is_fatal() {
        let result = Crosswalk::build(&[row("17", "001690", "", 2), row("17", "012141", "", 3)]);

        match result {
            Err(PipelineError::CrosswalkConflict { line, variant, .. }) => {
                assert_eq!(line, 3);
                assert_eq!(variant, "17");
            }
            other => panic!("expected crosswalk conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_exact_repeat_is_ignored() {
        let crosswalk =
            Crosswalk::build(&[row("17", "001690", "", 2), row("17", "001690", "", 3)]).unwrap();
        assert_eq!(crosswalk.variant_count(), 1);
    }

    #[test]
    fn test_blank_row_is_schema_violation() {
        let result = Crosswalk::build(&[row("17", "", "", 2)]);
        assert!(matches!(result, Err(PipelineError::Schema { line: 2, .. })));
    }

    #[test]
    fn test_canonical_key_lookup() {
        let crosswalk = Crosswalk::build(&[row("17", "001690", "", 2)]).unwrap();
        assert_eq!(crosswalk.canonical("001690"), Some(&FirmKey::new("001690")));
        assert_eq!(crosswalk.canonical("17"), None);
    }

    #[test]
    fn test_normalized_name_index_collects_candidates() {
        let crosswalk = Crosswalk::build(&[
            row("Acme Corp", "100", "", 2),
            row("ACME, Inc.", "200", "", 3),
            row("Boeing Co", "300", "lobbying", 4),
        ])
        .unwrap();

        let acme = crosswalk
            .by_normalized_name(SourceStream::Lobbying, "acme")
            .unwrap();
        assert_eq!(acme.len(), 2);

        assert!(crosswalk
            .by_normalized_name(SourceStream::Financial, "boeing")
            .is_none());
        assert!(crosswalk
            .by_normalized_name(SourceStream::Lobbying, "boeing")
            .is_some());
    }
}
