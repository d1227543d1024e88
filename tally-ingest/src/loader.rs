//! Parse delimited transaction exports into typed records.
//!
//! Expected header (case-insensitive, any order, extra columns allowed):
//! date,description,amount[,merchant]
//!
//! Bad rows fail the whole load; nothing downstream sees a partial file.

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use std::io::Read;
use std::path::Path;
use tally_core::Transaction;

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%m-%d-%Y"];

/// Column positions resolved from the header row
struct Layout {
    date: usize,
    description: usize,
    amount: usize,
    merchant: Option<usize>,
    extra: Vec<(usize, String)>,
}

impl Layout {
    fn from_headers(headers: &csv::StringRecord, source: &str) -> Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };

        let date = find("date").with_context(|| format!("{source}: missing required column 'date'"))?;
        let amount =
            find("amount").with_context(|| format!("{source}: missing required column 'amount'"))?;
        let merchant = find("merchant");
        // Exports without a description column fall back to the merchant name
        let description = match find("description").or(merchant) {
            Some(idx) => idx,
            None => bail!("{source}: missing required column 'description'"),
        };

        let known = [Some(date), Some(amount), Some(description), merchant];
        let extra = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| !known.contains(&Some(*i)))
            .map(|(i, h)| (i, h.trim().to_string()))
            .collect();

        Ok(Self {
            date,
            description,
            amount,
            merchant,
            extra,
        })
    }
}

/// Load one export from disk.
pub fn load_transactions(path: impl AsRef<Path>) -> Result<Vec<Transaction>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    read_transactions(file, &path.display().to_string())
}

/// Parse an export from any reader. `source` only appears in error messages.
pub fn read_transactions<R: Read>(data: R, source: &str) -> Result<Vec<Transaction>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data);

    let headers = rdr
        .headers()
        .with_context(|| format!("{source}: reading header row"))?
        .clone();
    let layout = Layout::from_headers(&headers, source)?;

    let mut txns = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        let line = i + 1;
        let record = result.with_context(|| format!("{source}: row {line}"))?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        let field = |idx: usize| record.get(idx).unwrap_or("").trim();

        let date_str = field(layout.date);
        let date = parse_date(date_str)
            .with_context(|| format!("{source}: row {line}: invalid date '{date_str}'"))?;

        let amount_str = field(layout.amount);
        let amount = parse_amount(amount_str)
            .with_context(|| format!("{source}: row {line}: invalid amount '{amount_str}'"))?;

        let mut txn = Transaction::new(txns.len(), date, field(layout.description), amount);
        // Blank cells stay `Some("")` so the writer still emits the column
        txn.merchant = layout.merchant.map(|idx| field(idx).to_string());
        txn.extra = layout
            .extra
            .iter()
            .map(|(idx, name)| (name.clone(), record.get(*idx).unwrap_or("").to_string()))
            .collect();

        txns.push(txn);
    }

    tracing::debug!(source, rows = txns.len(), "loaded transactions");
    Ok(txns)
}

/// Aggregate several account exports. Each record's `account` is the file
/// stem; rows keep argument order and are renumbered globally.
pub fn load_many<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Transaction>> {
    let mut all = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let account = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        for mut txn in load_transactions(path)? {
            txn.row = all.len();
            if paths.len() > 1 {
                txn.account = Some(account.clone());
            }
            all.push(txn);
        }
    }
    Ok(all)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

fn parse_amount(s: &str) -> Option<f64> {
    let s = s.trim();
    let (negative, s) = match s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, s),
    };
    let cleaned = s.replace([',', '$', ' '], "");
    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}
