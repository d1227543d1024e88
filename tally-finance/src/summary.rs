//! Spending analytics over categorized transactions

use std::collections::BTreeMap;
use std::fmt::Write as _;
use tally_core::{Category, EnrichedTransaction};

const RULE: &str = "============================================================";
const THIN: &str = "------------------------------------------------------------";

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRow {
    pub category: Category,
    pub total: f64,
    pub count: usize,
    pub average: f64,
    /// Share of the grand total, rounded to 0.1
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthRow {
    /// `YYYY-MM`
    pub month: String,
    pub total: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MerchantRow {
    pub merchant: String,
    pub total: f64,
}

/// Borrowed view over one run's output
pub struct SpendingSummary<'a> {
    records: &'a [EnrichedTransaction],
}

impl<'a> SpendingSummary<'a> {
    pub fn new(records: &'a [EnrichedTransaction]) -> Self {
        Self { records }
    }

    pub fn total_spending(&self) -> f64 {
        round2(self.records.iter().map(|r| r.transaction.amount).sum())
    }

    pub fn transaction_count(&self) -> usize {
        self.records.len()
    }

    pub fn average_transaction(&self) -> Option<f64> {
        if self.records.is_empty() {
            None
        } else {
            Some(self.total_spending() / self.records.len() as f64)
        }
    }

    /// Sorted by total descending, then category
    pub fn by_category(&self) -> Vec<CategoryRow> {
        let mut groups: BTreeMap<Category, (f64, usize)> = BTreeMap::new();
        for r in self.records {
            let e = groups.entry(r.category()).or_insert((0.0, 0));
            e.0 += r.transaction.amount;
            e.1 += 1;
        }

        let grand: f64 = groups.values().map(|(t, _)| round2(*t)).sum();
        let mut rows: Vec<CategoryRow> = groups
            .into_iter()
            .map(|(category, (total, count))| {
                let total = round2(total);
                let percentage = if grand != 0.0 {
                    (total / grand * 1000.0).round() / 10.0
                } else {
                    0.0
                };
                CategoryRow {
                    category,
                    total,
                    count,
                    average: round2(total / count as f64),
                    percentage,
                }
            })
            .collect();

        rows.sort_by(|a, b| b.total.total_cmp(&a.total).then(a.category.cmp(&b.category)));
        rows
    }

    pub fn top_categories(&self, n: usize) -> Vec<CategoryRow> {
        self.by_category().into_iter().take(n).collect()
    }

    /// Sorted by month
    pub fn monthly(&self) -> Vec<MonthRow> {
        let mut groups: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for r in self.records {
            let e = groups.entry(r.transaction.year_month()).or_insert((0.0, 0));
            e.0 += r.transaction.amount;
            e.1 += 1;
        }
        groups
            .into_iter()
            .map(|(month, (total, count))| MonthRow {
                month,
                total: round2(total),
                count,
            })
            .collect()
    }

    /// Category totals per month: (category, month, total), sorted by category then month
    pub fn category_by_month(&self) -> Vec<(Category, String, f64)> {
        let mut groups: BTreeMap<(Category, String), f64> = BTreeMap::new();
        for r in self.records {
            *groups
                .entry((r.category(), r.transaction.year_month()))
                .or_insert(0.0) += r.transaction.amount;
        }
        groups
            .into_iter()
            .map(|((c, m), t)| (c, m, round2(t)))
            .collect()
    }

    /// Keyed on merchant (or description when there is none)
    pub fn top_merchants(&self, n: usize) -> Vec<MerchantRow> {
        let mut groups: BTreeMap<&str, f64> = BTreeMap::new();
        for r in self.records {
            *groups.entry(r.transaction.label()).or_insert(0.0) += r.transaction.amount;
        }
        let mut rows: Vec<MerchantRow> = groups
            .into_iter()
            .map(|(merchant, total)| MerchantRow {
                merchant: merchant.to_string(),
                total: round2(total),
            })
            .collect();
        rows.sort_by(|a, b| b.total.total_cmp(&a.total).then_with(|| a.merchant.cmp(&b.merchant)));
        rows.truncate(n);
        rows
    }

    /// Rows for `monthly_summary.csv`
    pub fn monthly_table(&self) -> Vec<Vec<String>> {
        self.monthly()
            .into_iter()
            .map(|m| vec![m.month, format!("{:.2}", m.total), m.count.to_string()])
            .collect()
    }

    pub fn render_report(&self, top_n: usize) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{RULE}");
        let _ = writeln!(out, "SPENDING ANALYTICS DASHBOARD");
        let _ = writeln!(out, "{RULE}");
        let _ = writeln!(out);
        let _ = writeln!(out, "Total Spending: {}", money(self.total_spending()));
        let _ = writeln!(out, "Total Transactions: {}", self.transaction_count());
        if let Some(avg) = self.average_transaction() {
            let _ = writeln!(out, "Average Transaction: {}", money(avg));
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "TOP SPENDING CATEGORIES:");
        let _ = writeln!(out, "{THIN}");
        for row in self.top_categories(top_n) {
            let _ = writeln!(
                out,
                "  {:20} {:>11}  ({:>5.1}%)  [{} transactions]",
                row.category.as_str(),
                money(row.total),
                row.percentage,
                row.count
            );
        }

        let monthly = self.monthly();
        if !monthly.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "MONTHLY SPENDING SUMMARY:");
            let _ = writeln!(out, "{THIN}");
            for m in monthly {
                let _ = writeln!(out, "  {:10} {:>11}  [{} transactions]", m.month, money(m.total), m.count);
            }
        }

        let merchants = self.top_merchants(top_n);
        if !merchants.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "TOP MERCHANTS BY SPENDING:");
            let _ = writeln!(out, "{THIN}");
            for m in merchants {
                let _ = writeln!(out, "  {:30} {:>11}", m.merchant, money(m.total));
            }
        }

        let _ = writeln!(out);
        let _ = write!(out, "{RULE}");
        out
    }
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// `$1,234.56`, with a leading minus for negatives
pub(crate) fn money(v: f64) -> String {
    let cents = (v.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::new();
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if v < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${grouped}.{:02}", cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tally_core::{Categorization, RoutedResult, Transaction};

    fn rec(row: usize, date: (i32, u32, u32), desc: &str, amount: f64, cat: Category) -> EnrichedTransaction {
        let d = NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap();
        EnrichedTransaction {
            transaction: Transaction::new(row, d, desc, amount),
            result: RoutedResult::from_rule(Categorization::new(cat, 0.9, "kw")),
        }
    }

    fn sample() -> Vec<EnrichedTransaction> {
        vec![
            rec(0, (2026, 1, 3), "STARBUCKS", 5.0, Category::Dining),
            rec(1, (2026, 1, 9), "RENT", 1500.0, Category::Housing),
            rec(2, (2026, 2, 2), "STARBUCKS", 7.0, Category::Dining),
            rec(3, (2026, 2, 5), "CHIPOTLE", 12.5, Category::Dining),
        ]
    }

    #[test]
    fn test_money_format() {
        assert_eq!(money(0.0), "$0.00");
        assert_eq!(money(1234.5), "$1,234.50");
        assert_eq!(money(1234567.891), "$1,234,567.89");
        assert_eq!(money(-42.0), "-$42.00");
        assert_eq!(money(999.999), "$1,000.00");
    }

    #[test]
    fn test_by_category() {
        let records = sample();
        let rows = SpendingSummary::new(&records).by_category();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].category, Category::Housing);
        assert_eq!(rows[0].total, 1500.0);
        assert_eq!(rows[1].category, Category::Dining);
        assert_eq!(rows[1].count, 3);
        assert_eq!(rows[1].total, 24.5);
        assert_eq!(rows[1].average, 8.17);
        assert_eq!(rows[0].percentage, 98.4);
        assert_eq!(rows[1].percentage, 1.6);
    }

    #[test]
    fn test_monthly() {
        let records = sample();
        let months = SpendingSummary::new(&records).monthly();
        assert_eq!(
            months,
            vec![
                MonthRow { month: "2026-01".into(), total: 1505.0, count: 2 },
                MonthRow { month: "2026-02".into(), total: 19.5, count: 2 },
            ]
        );
    }

    #[test]
    fn test_category_by_month() {
        let records = sample();
        let rows = SpendingSummary::new(&records).category_by_month();
        assert_eq!(rows[0], (Category::Dining, "2026-01".to_string(), 5.0));
        assert_eq!(rows[1], (Category::Dining, "2026-02".to_string(), 19.5));
        assert_eq!(rows[2], (Category::Housing, "2026-01".to_string(), 1500.0));
    }

    #[test]
    fn test_top_merchants() {
        let records = sample();
        let top = SpendingSummary::new(&records).top_merchants(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].merchant, "RENT");
        assert_eq!(top[1].merchant, "CHIPOTLE");
        assert_eq!(top[1].total, 12.5);
    }

    #[test]
    fn test_report_sections() {
        let records = sample();
        let report = SpendingSummary::new(&records).render_report(5);
        assert!(report.contains("SPENDING ANALYTICS DASHBOARD"));
        assert!(report.contains("Total Spending: $1,524.50"));
        assert!(report.contains("Total Transactions: 4"));
        assert!(report.contains("MONTHLY SPENDING SUMMARY:"));
        assert!(report.contains("TOP MERCHANTS BY SPENDING:"));
    }

    #[test]
    fn test_empty_summary() {
        let summary = SpendingSummary::new(&[]);
        assert_eq!(summary.total_spending(), 0.0);
        assert_eq!(summary.average_transaction(), None);
        assert!(summary.by_category().is_empty());
        assert!(!summary.render_report(5).contains("MONTHLY"));
    }
}
