// 🔭 Filings overview
// Read-only look at the raw filings file before a run. Lenient: cells that
// would be fatal in the pipeline are counted here, not rejected.

use crate::model::{FilingTypeCell, Money, RawFiling};
use crate::normalizer::{parse_filing_type, parse_period_year};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientCount {
    pub client_id: String,
    pub filings: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilingsOverview {
    pub rows: usize,
    /// logical column → blank cells
    pub blanks: BTreeMap<String, usize>,
    pub numeric_amounts: usize,
    pub non_numeric_amounts: usize,
    /// `None` when the total does not fit in `i64` cents
    pub total_amount: Option<Money>,
    pub mean_amount: Option<f64>,
    pub median_amount: Option<f64>,
    pub top_clients: Vec<ClientCount>,
    pub filings_per_year: BTreeMap<i32, usize>,
    pub unparseable_periods: usize,
    /// original / amendment / no-activity / unrecognised → count
    pub filing_types: BTreeMap<String, usize>,
}

pub fn overview(filings: &[RawFiling], top: usize) -> FilingsOverview {
    let mut blanks: BTreeMap<String, usize> = BTreeMap::new();
    let mut amounts: Vec<Money> = Vec::new();
    let mut non_numeric_amounts = 0;
    let mut clients: HashMap<&str, usize> = HashMap::new();
    let mut filings_per_year: BTreeMap<i32, usize> = BTreeMap::new();
    let mut unparseable_periods = 0;
    let mut filing_types: BTreeMap<String, usize> = BTreeMap::new();

    for filing in filings {
        let mut cells = vec![
            ("client", filing.client_id.as_str()),
            ("period", filing.period.as_str()),
            ("amount", filing.amount.as_str()),
        ];
        match &filing.filing_type {
            FilingTypeCell::Column(value) => cells.push(("filing_type", value.as_str())),
            FilingTypeCell::Flags {
                amendment,
                no_activity,
            } => {
                cells.push(("is_amendment", amendment.as_str()));
                cells.push(("is_no_activity", no_activity.as_str()));
            }
        }
        for (name, value) in cells {
            let counter = blanks.entry(name.to_string()).or_insert(0);
            if value.trim().is_empty() {
                *counter += 1;
            }
        }

        match Money::parse(&filing.amount) {
            Ok(Some(amount)) => amounts.push(amount),
            Ok(None) => {}
            Err(_) => non_numeric_amounts += 1,
        }

        let client = filing.client_id.trim();
        if !client.is_empty() {
            *clients.entry(client).or_insert(0) += 1;
        }

        match parse_period_year(&filing.period) {
            Ok(year) => *filings_per_year.entry(year).or_insert(0) += 1,
            Err(_) => unparseable_periods += 1,
        }

        let kind = match parse_filing_type(&filing.filing_type) {
            Ok(kind) => kind.code().to_string(),
            Err(_) => "unrecognised".to_string(),
        };
        *filing_types.entry(kind).or_insert(0) += 1;
    }

    let total_amount = Money::checked_sum(amounts.iter().copied());
    let mean_amount = if amounts.is_empty() {
        None
    } else {
        let dollars: f64 = amounts.iter().map(Money::as_dollars).sum();
        Some(dollars / amounts.len() as f64)
    };
    let median_amount = median(&mut amounts);

    let mut top_clients: Vec<ClientCount> = clients
        .into_iter()
        .map(|(client_id, filings)| ClientCount {
            client_id: client_id.to_string(),
            filings,
        })
        .collect();
    top_clients.sort_by(|a, b| b.filings.cmp(&a.filings).then(a.client_id.cmp(&b.client_id)));
    top_clients.truncate(top);

    FilingsOverview {
        rows: filings.len(),
        blanks,
        numeric_amounts: amounts.len(),
        non_numeric_amounts,
        total_amount,
        mean_amount,
        median_amount,
        top_clients,
        filings_per_year,
        unparseable_periods,
        filing_types,
    }
}

fn median(amounts: &mut [Money]) -> Option<f64> {
    if amounts.is_empty() {
        return None;
    }
    amounts.sort();
    let mid = amounts.len() / 2;
    let cents = if amounts.len() % 2 == 0 {
        (amounts[mid - 1].cents() as i128 + amounts[mid].cents() as i128) as f64 / 2.0
    } else {
        amounts[mid].cents() as f64
    };
    Some(cents / 100.0)
}

impl FilingsOverview {
    /// Human-readable report for the terminal
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "📊 Filings overview");
        let _ = writeln!(out, "   Rows: {}", self.rows);

        let _ = writeln!(out, "\n🕳️  Blank cells");
        for (column, count) in &self.blanks {
            let _ = writeln!(out, "   {:<16} {}", column, count);
        }

        let _ = writeln!(
            out,
            "\n💰 Amounts ({} numeric, {} non-numeric)",
            self.numeric_amounts, self.non_numeric_amounts
        );
        match self.total_amount {
            Some(total) => {
                let _ = writeln!(out, "   Total:  {}", total);
            }
            None => {
                let _ = writeln!(out, "   Total:  exceeds the cents range");
            }
        }
        if let (Some(mean), Some(median)) = (self.mean_amount, self.median_amount) {
            let _ = writeln!(out, "   Mean:   {:.2}", mean);
            let _ = writeln!(out, "   Median: {:.2}", median);
        }

        let _ = writeln!(out, "\n🏢 Top clients by filing count");
        for client in &self.top_clients {
            let _ = writeln!(out, "   {:<16} {}", client.client_id, client.filings);
        }

        let _ = writeln!(out, "\n📅 Filings per year");
        for (year, count) in &self.filings_per_year {
            let _ = writeln!(out, "   {}  {}", year, count);
        }
        if self.unparseable_periods > 0 {
            let _ = writeln!(out, "   (unparseable periods: {})", self.unparseable_periods);
        }

        let _ = writeln!(out, "\n📑 Filing types");
        for (kind, count) in &self.filing_types {
            let _ = writeln!(out, "   {:<16} {}", kind, count);
        }

        out
    }
}

// ============================================================================
// TESTS
// ============================================================================
