//! Naive monthly spending forecast.
//!
//! Each series continues its last month-over-month change, floored at zero.
//! No model fitting; this is an offline extrapolation.

use chrono::{Datelike, Months, NaiveDate};
use std::collections::BTreeMap;
use tally_core::EnrichedTransaction;

use crate::summary::round2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Total,
    Category,
}

#[derive(Debug, Clone, Copy)]
pub struct ForecastConfig {
    pub months_ahead: u32,
    pub lookback_months: usize,
    pub granularity: Granularity,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            months_ahead: 3,
            lookback_months: 6,
            granularity: Granularity::Category,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRow {
    /// `YYYY-MM`
    pub month: String,
    /// Category name, or `TOTAL`
    pub category: String,
    pub forecast: f64,
    /// `linear` with two or more months of history, else `flat`
    pub method: &'static str,
}

impl ForecastRow {
    pub fn to_record(&self) -> Vec<String> {
        vec![
            self.month.clone(),
            self.category.clone(),
            format!("{:.2}", self.forecast),
            self.method.to_string(),
        ]
    }
}

pub const FORECAST_COLUMNS: [&str; 4] = ["month", "category", "forecast_total_spent", "method"];

/// Sorted by month, then forecast descending, then category.
pub fn forecast_spending(records: &[EnrichedTransaction], config: &ForecastConfig) -> Vec<ForecastRow> {
    let mut series: BTreeMap<String, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
    for r in records {
        let key = match config.granularity {
            Granularity::Total => "TOTAL".to_string(),
            Granularity::Category => r.category().to_string(),
        };
        *series
            .entry(key)
            .or_default()
            .entry(month_start(r.transaction.date))
            .or_insert(0.0) += r.transaction.amount;
    }

    let Some(last_month) = series.values().filter_map(|s| s.keys().next_back().copied()).max() else {
        return Vec::new();
    };
    let future: Vec<NaiveDate> = (1..=config.months_ahead)
        .filter_map(|i| last_month.checked_add_months(Months::new(i)))
        .collect();

    let mut rows = Vec::new();
    for (name, months) in &series {
        let history: Vec<f64> = months.values().copied().collect();
        let start = history.len().saturating_sub(config.lookback_months.max(1));
        let window = &history[start..];

        let (base, slope) = match window {
            [] => (0.0, 0.0),
            [only] => (*only, 0.0),
            [.., prev, last] => (*last, last - prev),
        };
        let method = if window.len() >= 2 { "linear" } else { "flat" };

        for (i, month) in future.iter().enumerate() {
            let step = (i + 1) as f64;
            rows.push(ForecastRow {
                month: month.format("%Y-%m").to_string(),
                category: name.clone(),
                forecast: round2((base + slope * step).max(0.0)),
                method,
            });
        }
    }

    rows.sort_by(|a, b| {
        a.month
            .cmp(&b.month)
            .then(b.forecast.total_cmp(&a.forecast))
            .then_with(|| a.category.cmp(&b.category))
    });
    rows
}

fn month_start(d: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(d.year(), d.month(), 1).unwrap_or(d)
}
