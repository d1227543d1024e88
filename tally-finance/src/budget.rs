//! Monthly budgets: loaded from TOML or derived from recent history, then
//! compared against the latest month's spending.

use anyhow::{Context, Result};
use chrono::{Datelike, Months, NaiveDate};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use tally_core::{Category, EnrichedTransaction};

use crate::summary::{money, round2};

#[derive(Debug, Clone, Copy)]
pub struct BudgetConfig {
    pub lookback_months: u32,
    pub discretionary_multiplier: f64,
    pub essentials_multiplier: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            lookback_months: 3,
            discretionary_multiplier: 0.90,
            essentials_multiplier: 1.05,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BudgetFile {
    #[serde(default)]
    budgets: BTreeMap<String, f64>,
}

/// Reads `[budgets]` from a TOML file. Missing or empty file → `None`.
pub fn load_budgets(path: &Path) -> Result<Option<BTreeMap<Category, f64>>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(None);
    }
    let file: BudgetFile = toml::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;

    let mut out = BTreeMap::new();
    for (name, amount) in file.budgets {
        match name.parse::<Category>() {
            Ok(cat) => {
                out.insert(cat, amount);
            }
            Err(e) => tracing::warn!(path = %path.display(), "skipping budget: {e}"),
        }
    }
    Ok(if out.is_empty() { None } else { Some(out) })
}

/// Average monthly spend per category over the lookback window, scaled down
/// for discretionary categories and up for essentials.
pub fn smart_budget(records: &[EnrichedTransaction], config: &BudgetConfig) -> BTreeMap<Category, f64> {
    let Some(last) = records.iter().map(|r| month_start(r.transaction.date)).max() else {
        return BTreeMap::new();
    };
    let window_start = last.checked_sub_months(Months::new(config.lookback_months)).unwrap_or(last);

    let mut monthly: BTreeMap<(Category, NaiveDate), f64> = BTreeMap::new();
    for r in records {
        let month = month_start(r.transaction.date);
        if month < window_start {
            continue;
        }
        *monthly.entry((r.category(), month)).or_insert(0.0) += r.transaction.amount;
    }

    let mut per_cat: BTreeMap<Category, (f64, usize)> = BTreeMap::new();
    for ((cat, _), total) in monthly {
        let e = per_cat.entry(cat).or_insert((0.0, 0));
        e.0 += total;
        e.1 += 1;
    }

    per_cat
        .into_iter()
        .map(|(cat, (sum, months))| {
            let avg = sum / months as f64;
            let multiplier = if cat.is_discretionary() {
                config.discretionary_multiplier
            } else {
                config.essentials_multiplier
            };
            (cat, round2((avg * multiplier).max(0.0)))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetLine {
    pub category: Category,
    pub spent: f64,
    pub budget: f64,
    pub remaining: f64,
    pub over_budget: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetStatus {
    /// `YYYY-MM`, empty when there were no records
    pub month: String,
    pub lines: Vec<BudgetLine>,
    pub total_spent: f64,
    pub total_budget: f64,
    pub over_budget: bool,
}

impl BudgetStatus {
    /// Spending in the latest month against `budgets`. Categories without a
    /// budget count as 0 and are never over.
    pub fn compute(records: &[EnrichedTransaction], budgets: &BTreeMap<Category, f64>) -> Self {
        let Some(month) = records.iter().map(|r| r.transaction.year_month()).max() else {
            return Self {
                month: String::new(),
                lines: Vec::new(),
                total_spent: 0.0,
                total_budget: 0.0,
                over_budget: false,
            };
        };

        let mut spent: BTreeMap<Category, f64> = BTreeMap::new();
        for r in records.iter().filter(|r| r.transaction.year_month() == month) {
            *spent.entry(r.category()).or_insert(0.0) += r.transaction.amount;
        }

        let mut total_spent = 0.0;
        let mut total_budget = 0.0;
        let mut lines: Vec<BudgetLine> = spent
            .into_iter()
            .map(|(category, spent)| {
                let budget = budgets.get(&category).copied().unwrap_or(0.0);
                total_spent += spent;
                total_budget += budget;
                BudgetLine {
                    category,
                    spent: round2(spent),
                    budget: round2(budget),
                    remaining: round2(budget - spent),
                    over_budget: budget > 0.0 && spent > budget,
                }
            })
            .collect();

        lines.sort_by(|a, b| {
            b.over_budget
                .cmp(&a.over_budget)
                .then(b.spent.total_cmp(&a.spent))
                .then(a.category.cmp(&b.category))
        });

        Self {
            month,
            lines,
            total_spent: round2(total_spent),
            total_budget: round2(total_budget),
            over_budget: total_budget > 0.0 && total_spent > total_budget,
        }
    }

    pub fn alerts(&self) -> impl Iterator<Item = &BudgetLine> {
        self.lines.iter().filter(|l| l.over_budget)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "BUDGET STATUS {}", self.month);
        let _ = writeln!(out, "------------------------------------------------------------");
        for l in &self.lines {
            let flag = if l.over_budget { "  OVER" } else { "" };
            let _ = writeln!(
                out,
                "  {:16} spent {:>11}  budget {:>11}  remaining {:>11}{flag}",
                l.category.as_str(),
                money(l.spent),
                money(l.budget),
                money(l.remaining)
            );
        }
        let _ = writeln!(out);
        let _ = write!(
            out,
            "Total: {} of {}{}",
            money(self.total_spent),
            money(self.total_budget),
            if self.over_budget { " (over budget)" } else { "" }
        );
        out
    }
}

pub fn budget_status(records: &[EnrichedTransaction], budgets: &BTreeMap<Category, f64>) -> BudgetStatus {
    BudgetStatus::compute(records, budgets)
}

fn month_start(d: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(d.year(), d.month(), 1).unwrap_or(d)
}
