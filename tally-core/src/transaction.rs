//! Transaction record shared by every pipeline stage

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One input row. Created by the loader, never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    /// Zero-based position in the (aggregated) input
    pub row: usize,
    /// Date of the transaction
    pub date: NaiveDate,
    /// Free-text description as exported by the bank
    pub description: String,
    /// Positive = money spent, negative = credit/refund
    pub amount: f64,
    /// Merchant cell (possibly blank) when the export has that column
    pub merchant: Option<String>,
    /// Account label (file stem) when several exports are aggregated
    pub account: Option<String>,
    /// Pass-through columns in input order
    pub extra: Vec<(String, String)>,
}

impl Transaction {
    /// Create a record with no merchant, account or extra columns
    pub fn new(row: usize, date: NaiveDate, description: impl Into<String>, amount: f64) -> Self {
        Self {
            row,
            date,
            description: description.into(),
            amount,
            merchant: None,
            account: None,
            extra: Vec::new(),
        }
    }

    pub fn with_merchant(mut self, merchant: impl Into<String>) -> Self {
        self.merchant = Some(merchant.into());
        self
    }

    pub fn with_extra(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((column.into(), value.into()));
        self
    }

    /// Merchant if present and non-blank, otherwise the description
    pub fn label(&self) -> &str {
        match self.merchant.as_deref().map(str::trim) {
            Some(m) if !m.is_empty() => m,
            _ => self.description.trim(),
        }
    }

    /// Returns true if this is money spent (positive amount)
    pub fn is_expense(&self) -> bool {
        self.amount > 0.0
    }

    /// `YYYY-MM` bucket used by the monthly reports
    pub fn year_month(&self) -> String {
        self.date.format("%Y-%m").to_string()
    }

    /// Value of a pass-through column, matched case-insensitively
    pub fn extra_value(&self, column: &str) -> Option<&str> {
        self.extra
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value.as_str())
    }
}
