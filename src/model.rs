// 🧱 Data model - firm-year grain
//
// Filing → LobbyingObservation ┐
//                              ├→ PanelRow
// RawFinancial → FinancialObservation ┘
//
// "Missing" is always `None`. A zero is only ever a zero the source reported.

use serde::{Serialize, Serializer};
use std::fmt;

// ============================================================================
// SOURCE STREAM
// ============================================================================

/// Which input stream a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStream {
    Lobbying,
    Financial,
}

impl SourceStream {
    pub fn code(&self) -> &'static str {
        match self {
            SourceStream::Lobbying => "lobbying",
            SourceStream::Financial => "financial",
        }
    }

    /// Parse a crosswalk scope cell. Blank means "applies to both streams".
    pub fn parse_scope(value: &str) -> Result<Option<SourceStream>, String> {
        match value.trim().to_lowercase().as_str() {
            "" | "*" | "any" | "both" => Ok(None),
            "lobbying" | "lobby" | "lda" => Ok(Some(SourceStream::Lobbying)),
            "financial" | "financials" | "compustat" => Ok(Some(SourceStream::Financial)),
            other => Err(format!("unknown stream scope '{}'", other)),
        }
    }
}

impl fmt::Display for SourceStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// PROVENANCE
// ============================================================================

/// Where a record came from: file name + 1-based line (header is line 1)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub file: String,
    pub line: usize,
}

impl Provenance {
    pub fn new(file: &str, line: usize) -> Self {
        Provenance {
            file: file.to_string(),
            line,
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

// ============================================================================
// CANONICAL FIRM KEY
// ============================================================================

/// Canonical firm key - the single identifier both streams are joined on
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FirmKey(String);

impl FirmKey {
    pub fn new(key: impl Into<String>) -> Self {
        FirmKey(key.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FirmKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// MONEY
// ============================================================================

/// Lobbying expenditure in exact integer cents, so sums and lag comparisons
/// are exact rather than float-approximate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Money {
    cents: i64,
}

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Money { cents }
    }

    pub fn from_dollars(dollars: i64) -> Self {
        Money {
            cents: dollars * 100,
        }
    }

    pub fn cents(&self) -> i64 {
        self.cents
    }

    pub fn as_dollars(&self) -> f64 {
        self.cents as f64 / 100.0
    }

    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Parse a source amount cell.
    ///
    /// Accepts `50000`, `50000.5`, `$50,000.00`, `-1,200`, `(1,200.00)`, `5e4`.
    /// Blank → `Ok(None)` (missing). Anything else non-numeric → `Err`.
    pub fn parse(text: &str) -> Result<Option<Money>, String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let (negative, cleaned) = unsigned_body(trimmed, text)?;
        if cleaned.is_empty() {
            return Err(format!("not a number: '{}'", text));
        }

        let cents = match parse_decimal_cents(&cleaned) {
            DecimalCents::Exact(c) => c,
            DecimalCents::Overflow => return Err(out_of_range(text)),
            DecimalCents::NotDecimal => {
                // Scientific notation and similar export artefacts
                let value: f64 = cleaned
                    .parse()
                    .map_err(|_| format!("not a number: '{}'", text))?;
                if !value.is_finite() {
                    return Err(format!("not a finite number: '{}'", text));
                }
                let scaled = (value * 100.0).round();
                // i64::MAX as f64 rounds up to 2^63, which is itself out of range
                if scaled.abs() >= i64::MAX as f64 {
                    return Err(out_of_range(text));
                }
                scaled as i64
            }
        };

        Ok(Some(Money::from_cents(if negative { -cents } else { cents })))
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.cents.checked_add(other.cents).map(Money::from_cents)
    }

    /// Sum without wrapping: `None` as soon as the running total leaves `i64` cents
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Option<Money> {
        amounts
            .into_iter()
            .try_fold(Money::default(), |total, amount| total.checked_add(amount))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn strip_sign(text: &str) -> (bool, &str) {
    if text.starts_with('(') && text.ends_with(')') && text.len() >= 2 {
        return (true, text[1..text.len() - 1].trim());
    }
    if let Some(rest) = text.strip_prefix('-') {
        return (true, rest.trim());
    }
    if let Some(rest) = text.strip_prefix('+') {
        return (false, rest.trim());
    }
    (false, text)
}

/// Strip the outer sign and the formatting characters. A second sign or a
/// stray parenthesis left in the body is an error; only an exponent may
/// carry its own sign (`5e-4`).
fn unsigned_body(trimmed: &str, text: &str) -> Result<(bool, String), String> {
    let (negative, body) = strip_sign(trimmed);
    let cleaned: String = body
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '_' | ' '))
        .collect();

    let mut previous = None;
    for c in cleaned.chars() {
        let stray = match c {
            '(' | ')' => true,
            '+' | '-' => !matches!(previous, Some('e') | Some('E')),
            _ => false,
        };
        if stray {
            return Err(format!("malformed sign: '{}'", text));
        }
        previous = Some(c);
    }

    Ok((negative, cleaned))
}

fn out_of_range(text: &str) -> String {
    format!("amount out of range: '{}'", text)
}

enum DecimalCents {
    Exact(i64),
    Overflow,
    NotDecimal,
}

/// Exact decimal → cents, rounding half away from zero at the third fractional digit
fn parse_decimal_cents(text: &str) -> DecimalCents {
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, f),
        None => (text, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return DecimalCents::NotDecimal;
    }
    let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) {
        return DecimalCents::NotDecimal;
    }

    let digits: Vec<u32> = frac_part.chars().filter_map(|c| c.to_digit(10)).collect();
    let tenths = *digits.first().unwrap_or(&0) as i64;
    let hundredths = *digits.get(1).unwrap_or(&0) as i64;
    let round_up = digits.get(2).map_or(false, |d| *d >= 5);

    let whole = if int_part.is_empty() {
        Some(0)
    } else {
        int_part.parse::<i64>().ok()
    };
    let cents = whole
        .and_then(|w| w.checked_mul(100))
        .and_then(|c| c.checked_add(tenths * 10 + hundredths))
        .and_then(|c| if round_up { c.checked_add(1) } else { Some(c) });

    match cents {
        Some(c) => DecimalCents::Exact(c),
        None => DecimalCents::Overflow,
    }
}

/// Parse a financial figure cell: blank → missing, otherwise a finite number.
/// Tolerates `$`, thousands separators and parenthesised negatives.
pub fn parse_figure(text: &str) -> Result<Option<f64>, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let (negative, cleaned) = unsigned_body(trimmed, text)?;
    let value: f64 = cleaned
        .parse()
        .map_err(|_| format!("not a number: '{}'", text))?;
    if !value.is_finite() {
        return Err(format!("not a finite number: '{}'", text));
    }
    Ok(Some(if negative { -value } else { value }))
}

// ============================================================================
// FILINGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilingType {
    Original,
    Amendment,
    NoActivity,
}

impl FilingType {
    pub fn code(&self) -> &'static str {
        match self {
            FilingType::Original => "original",
            FilingType::Amendment => "amendment",
            FilingType::NoActivity => "no-activity",
        }
    }
}

/// Filing-type cell(s) as read from the source, before interpretation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilingTypeCell {
    Column(String),
    Flags { amendment: String, no_activity: String },
}

/// One lobbying disclosure row exactly as the source wrote it
#[derive(Debug, Clone)]
pub struct RawFiling {
    pub client_id: String,
    pub period: String,
    pub amount: String,
    pub filing_type: FilingTypeCell,
    pub provenance: Provenance,
}

/// A standardized filing: typed period, amount and filing type. Immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct Filing {
    pub client_id: String,
    pub period: String,
    pub year: i32,
    /// `None` when the source left the amount blank
    pub amount: Option<Money>,
    pub filing_type: FilingType,
    pub provenance: Provenance,
}

/// Aggregated original-filing spend for one firm-year
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LobbyingObservation {
    pub firm: FirmKey,
    pub year: i32,
    pub spend: Money,
    pub filing_count: usize,
}

// ============================================================================
// FINANCIALS
// ============================================================================

/// One financial statement row exactly as the source wrote it
#[derive(Debug, Clone)]
pub struct RawFinancial {
    pub firm_id: String,
    pub year: String,
    pub revenue: String,
    pub net_income: String,
    pub assets: String,
    pub industry: String,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialObservation {
    pub firm: FirmKey,
    pub year: i32,
    pub revenue: Option<f64>,
    pub net_income: Option<f64>,
    pub assets: Option<f64>,
    pub industry: Option<String>,
    #[serde(skip)]
    pub provenance: Provenance,
}

// ============================================================================
// PANEL ROW
// ============================================================================

/// The analysis-ready unit, uniquely keyed by (firm_key, year).
/// Column order here is the column order of the released panel table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelRow {
    pub firm_key: FirmKey,
    pub year: i32,
    pub lobbying_spend: Option<Money>,
    pub lagged_lobbying_spend: Option<Money>,
    pub revenue: Option<f64>,
    pub net_income: Option<f64>,
    pub assets: Option<f64>,
    pub industry: Option<String>,
}

impl PanelRow {
    pub fn has_financials(&self) -> bool {
        self.revenue.is_some() || self.net_income.is_some() || self.assets.is_some()
    }
}

/// Column names of the released panel table, in order
pub const PANEL_COLUMNS: [&str; 8] = [
    "firm_key",
    "year",
    "lobbying_spend",
    "lagged_lobbying_spend",
    "revenue",
    "net_income",
    "assets",
    "industry",
];

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_parse_plain_and_formatted() {
        assert_eq!(Money::parse("50000").unwrap(), Some(Money::from_dollars(50_000)));
        assert_eq!(Money::parse("$50,000.00").unwrap(), Some(Money::from_dollars(50_000)));
        assert_eq!(Money::parse(" 30000.5 ").unwrap(), Some(Money::from_cents(3_000_050)));
        assert_eq!(Money::parse(".25").unwrap(), Some(Money::from_cents(25)));
        assert_eq!(Money::parse("5e4").unwrap(), Some(Money::from_dollars(50_000)));
    }

    #[test]
    fn test_money_parse_negative_forms() {
        assert_eq!(Money::parse("-1,200").unwrap(), Some(Money::from_dollars(-1_200)));
        assert_eq!(Money::parse("(1,200.00)").unwrap(), Some(Money::from_dollars(-1_200)));
    }

    #[test]
    fn test_money_parse_rounds_to_cents() {
        assert_eq!(Money::parse("10.005").unwrap(), Some(Money::from_cents(1_001)));
        assert_eq!(Money::parse("10.004").unwrap(), Some(Money::from_cents(1_000)));
    }

    #[test]
    fn test_money_parse_blank_is_missing_not_zero() {
        assert_eq!(Money::parse("").unwrap(), None);
        assert_eq!(Money::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_money_parse_rejects_text() {
        assert!(Money::parse("twelve").is_err());
        assert!(Money::parse("$").is_err());
        assert!(Money::parse("NaN").is_err());
        assert!(Money::parse("inf").is_err());
    }

    #[test]
    fn test_money_parse_rejects_double_signs() {
        for cell in ["--5", "(-5)", "+-5", "-(5)", "-+5", "5-", "(5", "1(2)"] {
            assert!(Money::parse(cell).is_err(), "{} should be rejected", cell);
        }
        // An exponent keeps its own sign
        assert_eq!(Money::parse("5e-2").unwrap(), Some(Money::from_cents(5)));
        assert_eq!(Money::parse("-1.5E+3").unwrap(), Some(Money::from_dollars(-1_500)));
    }

    #[test]
    fn test_money_parse_rejects_amounts_beyond_i64_cents() {
        let err = Money::parse("99999999999999999999").unwrap_err();
        assert!(err.contains("out of range"), "{}", err);
        assert!(Money::parse("-99999999999999999999").is_err());
        assert!(Money::parse("92233720368547758.08").is_err());
        assert!(Money::parse("1e30").is_err());

        let largest = Money::parse("92233720368547758.07").unwrap().unwrap();
        assert_eq!(largest.cents(), i64::MAX);
    }

    #[test]
    fn test_money_checked_sum() {
        let amounts = [Money::from_dollars(50_000), Money::from_dollars(30_000)];
        assert_eq!(Money::checked_sum(amounts), Some(Money::from_dollars(80_000)));
        assert_eq!(Money::checked_sum(Vec::new()), Some(Money::default()));

        let huge = Money::parse("90000000000000000").unwrap().unwrap();
        assert_eq!(Money::checked_sum([huge, huge]), None);
        let less = huge.checked_add(Money::from_cents(-1));
        assert_eq!(less, Some(Money::from_cents(huge.cents() - 1)));
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_dollars(80_000).to_string(), "80000.00");
        assert_eq!(Money::from_cents(-5).to_string(), "-0.05");
        assert_eq!(Money::from_cents(123_456).to_string(), "1234.56");
    }

    #[test]
    fn test_parse_figure() {
        assert_eq!(parse_figure("1,234.5").unwrap(), Some(1234.5));
        assert_eq!(parse_figure("(12)").unwrap(), Some(-12.0));
        assert_eq!(parse_figure("").unwrap(), None);
        assert!(parse_figure("n/a").is_err());
    }

    #[test]
    fn test_parse_figure_rejects_double_signs() {
        assert!(parse_figure("(-12)").is_err());
        assert!(parse_figure("--12").is_err());
        assert!(parse_figure("+-12").is_err());
        assert_eq!(parse_figure("-4202").unwrap(), Some(-4202.0));
    }

    #[test]
    fn test_parse_scope() {
        assert_eq!(SourceStream::parse_scope("").unwrap(), None);
        assert_eq!(SourceStream::parse_scope("Lobbying").unwrap(), Some(SourceStream::Lobbying));
        assert_eq!(SourceStream::parse_scope("financial").unwrap(), Some(SourceStream::Financial));
        assert!(SourceStream::parse_scope("weather").is_err());
    }

    #[test]
    fn test_firm_key_trims() {
        assert_eq!(FirmKey::new("  001690 ").as_str(), "001690");
    }
}
