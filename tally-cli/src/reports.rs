use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tally_core::EnrichedTransaction;
use tally_finance::budget::BudgetStatus;
use tally_finance::forecast::{FORECAST_COLUMNS, ForecastRow};
use tally_finance::{AnomalyFlag, AnomalyReport, SpendingSummary};
use tally_ingest::write_table;

pub const SUMMARY_TOP_N: usize = 5;

const MONTHLY_COLUMNS: [&str; 3] = ["month", "total_spent", "transaction_count"];

/// Everything one run reports on
pub struct RunReports<'a> {
    pub records: &'a [EnrichedTransaction],
    pub flags: &'a [AnomalyFlag],
    pub forecast: &'a [ForecastRow],
    pub budget: &'a BudgetStatus,
}

impl RunReports<'_> {
    pub fn summary_text(&self) -> String {
        SpendingSummary::new(self.records).render_report(SUMMARY_TOP_N)
    }

    pub fn anomaly_text(&self) -> String {
        AnomalyReport::build(self.flags).render(self.records, self.flags)
    }

    /// Writes the report files into `dir` and returns their paths.
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        let mut written = Vec::new();

        let p = dir.join("spending_summary.txt");
        write_text(&p, &self.summary_text())?;
        written.push(p);

        let p = dir.join("monthly_summary.csv");
        let monthly = SpendingSummary::new(self.records).monthly_table();
        if monthly.is_empty() {
            tracing::warn!("no monthly summary data; writing header only");
        }
        write_table(&p, &MONTHLY_COLUMNS, &monthly)?;
        written.push(p);

        let p = dir.join("anomaly_report.txt");
        write_text(&p, &self.anomaly_text())?;
        written.push(p);

        let p = dir.join("forecast.csv");
        let rows: Vec<Vec<String>> = self.forecast.iter().map(|r| r.to_record()).collect();
        write_table(&p, &FORECAST_COLUMNS, &rows)?;
        written.push(p);

        let p = dir.join("budget_status.txt");
        write_text(&p, &self.budget.render())?;
        written.push(p);

        Ok(written)
    }
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    let mut body = text.to_string();
    if !body.ends_with('\n') {
        body.push('\n');
    }
    fs::write(path, body).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tally_core::{Categorization, Category, RoutedResult, Transaction};
    use tally_finance::forecast::{ForecastConfig, forecast_spending};
    use tally_finance::{AnomalyDetector, budget_status};

    fn records() -> Vec<EnrichedTransaction> {
        let d = |m, day| chrono::NaiveDate::from_ymd_opt(2026, m, day).unwrap();
        vec![
            EnrichedTransaction {
                transaction: Transaction::new(0, d(1, 4), "STARBUCKS", 4.75),
                result: RoutedResult::from_rule(Categorization::new(Category::Food, 0.9, "kw")),
            },
            EnrichedTransaction {
                transaction: Transaction::new(1, d(2, 3), "RENT", 1850.0),
                result: RoutedResult::from_rule(Categorization::new(Category::Housing, 0.9, "kw")),
            },
        ]
    }

    #[test]
    fn test_writes_all_report_files() {
        let records = records();
        let flags = AnomalyDetector::default().detect(&records);
        let forecast = forecast_spending(&records, &ForecastConfig::default());
        let budget = budget_status(&records, &BTreeMap::from([(Category::Housing, 1800.0)]));
        let reports = RunReports {
            records: &records,
            flags: &flags,
            forecast: &forecast,
            budget: &budget,
        };

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reports");
        let written = reports.write_to(&out).unwrap();
        assert_eq!(written.len(), 5);
        assert!(written.iter().all(|p| p.exists()));

        let monthly = fs::read_to_string(out.join("monthly_summary.csv")).unwrap();
        assert_eq!(
            monthly,
            "month,total_spent,transaction_count\n2026-01,4.75,1\n2026-02,1850.00,1\n"
        );

        let forecast = fs::read_to_string(out.join("forecast.csv")).unwrap();
        assert!(forecast.starts_with("month,category,forecast_total_spent,method\n2026-03,Housing,1850.00,flat\n"));

        let budget = fs::read_to_string(out.join("budget_status.txt")).unwrap();
        assert!(budget.contains("OVER"));
        assert!(fs::read_to_string(out.join("anomaly_report.txt")).unwrap().contains("ANOMALY DETECTION REPORT"));
    }
}
