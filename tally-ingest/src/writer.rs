//! Write enriched transactions and report tables as CSV.
//!
//! Column order is fixed and numbers use a stable format, so the same input
//! produces byte-identical files.

use anyhow::{Context, Result, bail};
use std::io::Write;
use std::path::Path;
use tally_core::EnrichedTransaction;

const ROUTING_COLUMNS: [&str; 5] = ["category", "confidence", "reason", "source", "rule_confidence"];

/// Extra per-row columns appended after the routing columns (e.g. anomaly flags)
#[derive(Debug, Clone, Default)]
pub struct AppendedColumns {
    pub names: Vec<String>,
    /// One entry per record, each with `names.len()` values
    pub values: Vec<Vec<String>>,
}

/// Write the enriched table to `path`.
pub fn write_enriched(
    path: impl AsRef<Path>,
    records: &[EnrichedTransaction],
    appended: Option<&AppendedColumns>,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let file = std::fs::File::create(path).with_context(|| format!("create {}", path.display()))?;
    write_enriched_to(file, records, appended).with_context(|| format!("write {}", path.display()))
}

pub fn write_enriched_to<W: Write>(
    out: W,
    records: &[EnrichedTransaction],
    appended: Option<&AppendedColumns>,
) -> Result<()> {
    if let Some(cols) = appended {
        if cols.values.len() != records.len() {
            bail!(
                "appended columns cover {} rows, expected {}",
                cols.values.len(),
                records.len()
            );
        }
    }

    let has_merchant = records.iter().any(|r| r.transaction.merchant.is_some());
    let has_account = records.iter().any(|r| r.transaction.account.is_some());
    let extra_names = extra_column_union(records);

    let mut leading: Vec<String> = vec!["date".into(), "description".into(), "amount".into()];
    if has_merchant {
        leading.push("merchant".into());
    }
    if has_account {
        leading.push("account".into());
    }
    let mut trailing: Vec<String> = ROUTING_COLUMNS.iter().map(|s| s.to_string()).collect();
    if let Some(cols) = appended {
        trailing.extend(cols.names.iter().cloned());
    }

    let owned: Vec<&String> = leading.iter().chain(trailing.iter()).collect();
    let mut header = leading.clone();
    header.extend(passthrough_names(&extra_names, &owned));
    header.extend(trailing);

    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(&header)?;

    for (i, rec) in records.iter().enumerate() {
        let txn = &rec.transaction;
        let res = &rec.result;

        let mut row: Vec<String> = vec![
            txn.date.format("%Y-%m-%d").to_string(),
            txn.description.clone(),
            format!("{:.2}", txn.amount),
        ];
        if has_merchant {
            row.push(txn.merchant.clone().unwrap_or_default());
        }
        if has_account {
            row.push(txn.account.clone().unwrap_or_default());
        }
        for name in &extra_names {
            row.push(
                txn.extra
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default(),
            );
        }
        row.push(res.category.to_string());
        row.push(format!("{}", res.confidence));
        row.push(res.reason.clone());
        row.push(res.source().to_string());
        row.push(res.rule_confidence().map(|c| format!("{c}")).unwrap_or_default());
        if let Some(cols) = appended {
            row.extend(cols.values[i].iter().cloned());
        }

        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Write a plain table with a header row.
pub fn write_table(path: impl AsRef<Path>, header: &[&str], rows: &[Vec<String>]) -> Result<()> {
    let path = path.as_ref();
    let mut wtr = csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    wtr.write_record(header)?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush().with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Output names for pass-through columns. A name that collides with a column
/// the writer owns (ignoring case) gets an `input_` prefix.
fn passthrough_names(extra: &[String], owned: &[&String]) -> Vec<String> {
    let mut taken: Vec<String> = owned.iter().map(|s| s.to_ascii_lowercase()).collect();
    let mut names = Vec::with_capacity(extra.len());
    for name in extra {
        let mut out = name.clone();
        while taken.contains(&out.to_ascii_lowercase()) {
            out = format!("input_{out}");
        }
        if &out != name {
            tracing::warn!(column = %name, renamed = %out, "input column clashes with an output column");
        }
        taken.push(out.to_ascii_lowercase());
        names.push(out);
    }
    names
}

fn extra_column_union(records: &[EnrichedTransaction]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for rec in records {
        for (name, _) in &rec.transaction.extra {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    }
    names
}
