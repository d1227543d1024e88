//! Statistical anomaly flags over one run's amounts.
//!
//! Checks run in a fixed order and a record keeps the first check that
//! flags it: z-score, IQR, per-category outlier, suspicious merchant,
//! unusually large amount.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use tally_core::{Category, EnrichedTransaction};

use crate::summary::money;

pub const ANOMALY_COLUMNS: [&str; 3] = ["is_anomaly", "anomaly_score", "anomaly_reason"];

const SUSPICIOUS_KEYWORDS: [&str; 7] = [
    "unknown",
    "payment",
    "card transaction",
    "square",
    "transfer",
    "pending",
    "unidentified",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AnomalyKind {
    StatisticalOutlier,
    IqrOutlier,
    CategoryOutlier,
    SuspiciousMerchant,
    LargeTransaction,
}

impl AnomalyKind {
    pub fn label(&self) -> &'static str {
        match self {
            AnomalyKind::StatisticalOutlier => "Statistical Outlier",
            AnomalyKind::IqrOutlier => "IQR Outlier",
            AnomalyKind::CategoryOutlier => "Category Outlier",
            AnomalyKind::SuspiciousMerchant => "Unknown Merchant",
            AnomalyKind::LargeTransaction => "Large Transaction",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnomalyFlag {
    pub kind: Option<AnomalyKind>,
    pub score: f64,
    pub reason: String,
}

impl AnomalyFlag {
    pub fn is_anomaly(&self) -> bool {
        self.kind.is_some()
    }

    /// Values for `ANOMALY_COLUMNS`
    pub fn columns(&self) -> Vec<String> {
        vec![
            self.is_anomaly().to_string(),
            format!("{:.2}", self.score),
            self.reason.clone(),
        ]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AnomalyDetector {
    pub z_score_threshold: f64,
    pub iqr_multiplier: f64,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self {
            z_score_threshold: 2.5,
            iqr_multiplier: 1.5,
        }
    }
}

impl AnomalyDetector {
    /// One flag per record, same order.
    pub fn detect(&self, records: &[EnrichedTransaction]) -> Vec<AnomalyFlag> {
        let mut flags = vec![AnomalyFlag::default(); records.len()];
        let amounts: Vec<f64> = records.iter().map(|r| r.transaction.amount).collect();

        self.statistical_outliers(&amounts, &mut flags);
        self.iqr_outliers(&amounts, &mut flags);
        category_outliers(records, &mut flags);
        suspicious_merchants(records, &mut flags);
        large_transactions(&amounts, &mut flags);

        let flagged = flags.iter().filter(|f| f.is_anomaly()).count();
        tracing::info!(records = records.len(), flagged, "anomaly detection finished");
        flags
    }

    fn statistical_outliers(&self, amounts: &[f64], flags: &mut [AnomalyFlag]) {
        if amounts.len() < 3 {
            return;
        }
        let mean = mean(amounts);
        let std = sample_std(amounts, mean);
        if std <= 0.0 {
            return;
        }
        for (i, &amount) in amounts.iter().enumerate() {
            let z = ((amount - mean) / std).abs();
            if z > self.z_score_threshold {
                flag(
                    &mut flags[i],
                    AnomalyKind::StatisticalOutlier,
                    z,
                    format!(
                        "Statistical outlier: Z-score {:.2} (amount {} vs mean {})",
                        z,
                        money(amount),
                        money(mean)
                    ),
                );
            }
        }
    }

    fn iqr_outliers(&self, amounts: &[f64], flags: &mut [AnomalyFlag]) {
        if amounts.len() < 3 {
            return;
        }
        let mut sorted = amounts.to_vec();
        sorted.sort_by(f64::total_cmp);
        let q1 = quantile(&sorted, 0.25);
        let q3 = quantile(&sorted, 0.75);
        let iqr = q3 - q1;
        if iqr <= 0.0 {
            return;
        }
        let lower = q1 - self.iqr_multiplier * iqr;
        let upper = q3 + self.iqr_multiplier * iqr;

        for (i, &amount) in amounts.iter().enumerate() {
            let distance = if amount > upper {
                amount - upper
            } else if amount < lower {
                lower - amount
            } else {
                continue;
            };
            flag(
                &mut flags[i],
                AnomalyKind::IqrOutlier,
                distance / iqr,
                format!(
                    "IQR outlier: amount {} outside range [{}, {}]",
                    money(amount),
                    money(lower),
                    money(upper)
                ),
            );
        }
    }
}

fn category_outliers(records: &[EnrichedTransaction], flags: &mut [AnomalyFlag]) {
    let mut by_category: BTreeMap<Category, Vec<usize>> = BTreeMap::new();
    for (i, r) in records.iter().enumerate() {
        by_category.entry(r.category()).or_default().push(i);
    }

    for (category, idxs) in by_category {
        if idxs.len() < 2 {
            continue;
        }
        let amounts: Vec<f64> = idxs.iter().map(|&i| records[i].transaction.amount).collect();
        let mean = mean(&amounts);
        let std = sample_std(&amounts, mean);
        if std <= 0.0 {
            continue;
        }
        let threshold = mean + 2.0 * std;
        for (&i, &amount) in idxs.iter().zip(&amounts) {
            if amount > threshold {
                flag(
                    &mut flags[i],
                    AnomalyKind::CategoryOutlier,
                    (amount - mean) / std,
                    format!(
                        "Category outlier: {} in '{}' (category avg: {})",
                        money(amount),
                        category,
                        money(mean)
                    ),
                );
            }
        }
    }
}

fn suspicious_merchants(records: &[EnrichedTransaction], flags: &mut [AnomalyFlag]) {
    for (i, r) in records.iter().enumerate() {
        let label = r.transaction.label();
        let lower = label.to_lowercase();
        if SUSPICIOUS_KEYWORDS.iter().any(|k| lower.contains(k)) {
            flag(
                &mut flags[i],
                AnomalyKind::SuspiciousMerchant,
                1.0,
                format!("Unknown/suspicious merchant: '{label}'"),
            );
        }
    }
}

fn large_transactions(amounts: &[f64], flags: &mut [AnomalyFlag]) {
    if amounts.len() < 3 {
        return;
    }
    let mut sorted = amounts.to_vec();
    sorted.sort_by(f64::total_cmp);
    let median = quantile(&sorted, 0.5);
    if median <= 0.0 {
        return;
    }
    let limit = median * 5.0;
    for (i, &amount) in amounts.iter().enumerate() {
        if amount > limit {
            flag(
                &mut flags[i],
                AnomalyKind::LargeTransaction,
                amount / median,
                format!(
                    "Unusually large transaction: {} (> {}, median: {})",
                    money(amount),
                    money(limit),
                    money(median)
                ),
            );
        }
    }
}

/// First check to fire wins
fn flag(slot: &mut AnomalyFlag, kind: AnomalyKind, score: f64, reason: String) {
    if slot.is_anomaly() {
        return;
    }
    *slot = AnomalyFlag {
        kind: Some(kind),
        score,
        reason,
    };
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample standard deviation (n - 1)
fn sample_std(xs: &[f64], mean: f64) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    var.sqrt()
}

/// Linear interpolation between closest ranks; `sorted` must be non-empty and ascending
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = (sorted.len() - 1) as f64 * q;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Aggregate view of the flags for the text report
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyReport {
    pub total: usize,
    pub flagged: usize,
    /// Percent of records flagged
    pub rate: f64,
    pub by_kind: BTreeMap<AnomalyKind, usize>,
    /// Record indices, highest score first (max five)
    pub top: Vec<usize>,
}

impl AnomalyReport {
    pub fn build(flags: &[AnomalyFlag]) -> Self {
        let mut by_kind = BTreeMap::new();
        for kind in flags.iter().filter_map(|f| f.kind) {
            *by_kind.entry(kind).or_insert(0) += 1;
        }
        let flagged: usize = by_kind.values().sum();
        let rate = if flags.is_empty() {
            0.0
        } else {
            flagged as f64 / flags.len() as f64 * 100.0
        };

        let mut top: Vec<usize> = (0..flags.len()).filter(|&i| flags[i].is_anomaly()).collect();
        top.sort_by(|&a, &b| flags[b].score.total_cmp(&flags[a].score).then(a.cmp(&b)));
        top.truncate(5);

        Self {
            total: flags.len(),
            flagged,
            rate,
            by_kind,
            top,
        }
    }

    pub fn render(&self, records: &[EnrichedTransaction], flags: &[AnomalyFlag]) -> String {
        let rule = "=".repeat(60);
        let thin = "-".repeat(60);
        let mut out = String::new();
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "ANOMALY DETECTION REPORT");
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out);
        let _ = writeln!(out, "Total Transactions Analyzed: {}", self.total);
        let _ = writeln!(out, "Anomalies Detected: {}", self.flagged);
        let _ = writeln!(out, "Anomaly Rate: {:.1}%", self.rate);
        let _ = writeln!(out);

        if !self.by_kind.is_empty() {
            let _ = writeln!(out, "ANOMALIES BY TYPE:");
            let _ = writeln!(out, "{thin}");
            for (kind, count) in &self.by_kind {
                let _ = writeln!(out, "  {:30} {:>3}", kind.label(), count);
            }
            let _ = writeln!(out);
        }

        if self.top.is_empty() {
            let _ = writeln!(out, "No anomalies detected. All transactions appear normal.");
        } else {
            let _ = writeln!(out, "TOP ANOMALIES (by severity):");
            let _ = writeln!(out, "{thin}");
            for (n, &i) in self.top.iter().enumerate() {
                let (Some(rec), Some(f)) = (records.get(i), flags.get(i)) else {
                    continue;
                };
                let _ = writeln!(out);
                let _ = writeln!(out, "{}. {} - {}", n + 1, rec.transaction.label(), money(rec.transaction.amount));
                let _ = writeln!(out, "   Date: {}", rec.transaction.date.format("%Y-%m-%d"));
                let _ = writeln!(out, "   Category: {}", rec.category());
                let _ = writeln!(out, "   Score: {:.2}", f.score);
                let _ = writeln!(out, "   Reason: {}", f.reason);
            }
        }

        let _ = writeln!(out);
        let _ = write!(out, "{rule}");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tally_core::{Categorization, RoutedResult, Transaction};

    fn rec(row: usize, desc: &str, amount: f64, cat: Category) -> EnrichedTransaction {
        let d = NaiveDate::from_ymd_opt(2026, 1, 1 + row as u32 % 28).unwrap();
        EnrichedTransaction {
            transaction: Transaction::new(row, d, desc, amount),
            result: RoutedResult::from_rule(Categorization::new(cat, 0.9, "kw")),
        }
    }

    #[test]
    fn test_quantile_matches_linear_interpolation() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&xs, 0.25), 1.75);
        assert_eq!(quantile(&xs, 0.5), 2.5);
        assert_eq!(quantile(&xs, 0.75), 3.25);
    }

    #[test]
    fn test_sample_std() {
        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let m = mean(&xs);
        assert!((sample_std(&xs, m) - 2.138_089_935).abs() < 1e-6);
    }

    #[test]
    fn test_big_amount_is_flagged_by_iqr() {
        let mut records: Vec<EnrichedTransaction> = (0..9)
            .map(|i| rec(i, "CAFE", 10.0 + i as f64, Category::Dining))
            .collect();
        records.push(rec(9, "CAFE", 500.0, Category::Dining));

        let flags = AnomalyDetector::default().detect(&records);
        assert!(flags[9].is_anomaly());
        // 10 points: max |z| = (n-1)/sqrt(n) ≈ 2.85 > 2.5
        assert_eq!(flags[9].kind, Some(AnomalyKind::StatisticalOutlier));
        assert!(flags[..9].iter().all(|f| !f.is_anomaly()));
    }

    #[test]
    fn test_iqr_catches_what_z_misses() {
        let amounts = [10.0, 11.0, 12.0, 13.0, 100.0];
        let records: Vec<_> = amounts
            .iter()
            .enumerate()
            .map(|(i, &a)| rec(i, "SHOP", a, Category::Shopping))
            .collect();
        let flags = AnomalyDetector::default().detect(&records);
        // n = 5 caps |z| at 1.79, so only the IQR check can fire
        assert_eq!(flags[4].kind, Some(AnomalyKind::IqrOutlier));
        assert!(flags[4].reason.starts_with("IQR outlier: amount $100.00 outside range"));
    }

    #[test]
    fn test_suspicious_merchant() {
        let records = vec![
            rec(0, "CAFE", 10.0, Category::Dining),
            rec(1, "ZELLE TRANSFER TO J", 10.0, Category::Uncategorized),
        ];
        let flags = AnomalyDetector::default().detect(&records);
        assert!(!flags[0].is_anomaly());
        assert_eq!(flags[1].kind, Some(AnomalyKind::SuspiciousMerchant));
        assert_eq!(flags[1].score, 1.0);
        assert_eq!(flags[1].reason, "Unknown/suspicious merchant: 'ZELLE TRANSFER TO J'");
    }

    #[test]
    fn test_uniform_amounts_are_normal() {
        let records: Vec<_> = (0..5).map(|i| rec(i, "NETFLIX", 15.49, Category::Subscriptions)).collect();
        let flags = AnomalyDetector::default().detect(&records);
        assert!(flags.iter().all(|f| !f.is_anomaly()));
        let report = AnomalyReport::build(&flags);
        assert_eq!(report.flagged, 0);
        assert!(report.render(&records, &flags).contains("No anomalies detected."));
    }

    #[test]
    fn test_small_inputs_skip_statistics() {
        let records = vec![rec(0, "CAFE", 1.0, Category::Dining), rec(1, "CAFE", 1000.0, Category::Dining)];
        let flags = AnomalyDetector::default().detect(&records);
        assert!(flags.iter().all(|f| !f.is_anomaly()));
    }

    #[test]
    fn test_report_counts_and_top() {
        let records = vec![
            rec(0, "CAFE", 10.0, Category::Dining),
            rec(1, "PENDING AUTH", 10.0, Category::Dining),
            rec(2, "UNKNOWN VENDOR", 10.0, Category::Dining),
        ];
        let flags = AnomalyDetector::default().detect(&records);
        let report = AnomalyReport::build(&flags);
        assert_eq!(report.total, 3);
        assert_eq!(report.flagged, 2);
        assert_eq!(report.by_kind.get(&AnomalyKind::SuspiciousMerchant), Some(&2));
        assert_eq!(report.top, vec![1, 2]);
        assert!((report.rate - 66.666).abs() < 0.01);

        let text = report.render(&records, &flags);
        assert!(text.contains("Anomaly Rate: 66.7%"));
        assert!(text.contains("1. PENDING AUTH - $10.00"));
    }

    #[test]
    fn test_flag_columns() {
        let f = AnomalyFlag {
            kind: Some(AnomalyKind::LargeTransaction),
            score: 6.123,
            reason: "big".into(),
        };
        assert_eq!(f.columns(), vec!["true", "6.12", "big"]);
        assert_eq!(AnomalyFlag::default().columns(), vec!["false", "0.00", ""]);
    }
}
