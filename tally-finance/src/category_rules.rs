//! Deterministic keyword rules mapping descriptions to categories.
//!
//! Confidence is binary: a keyword hit scores 0.9, anything else 0.3.
//! Extra hits within a category do not raise it.

use tally_core::{Categorization, Category, RuleTable, Transaction};

pub const RULE_MATCH_CONFIDENCE: f64 = 0.9;
pub const RULE_MISS_CONFIDENCE: f64 = 0.3;

/// Substring matcher over an ordered rule table
#[derive(Debug, Clone)]
pub struct RuleCategorizer {
    table: RuleTable,
}

impl RuleCategorizer {
    pub fn new(table: RuleTable) -> Self {
        Self { table }
    }

    /// Categorize one transaction. Total over any description, empty included.
    /// Priority: first category in table order with any keyword in the description.
    pub fn categorize(&self, txn: &Transaction) -> Categorization {
        self.categorize_text(&txn.description)
    }

    pub fn categorize_text(&self, description: &str) -> Categorization {
        let desc = description.to_lowercase();

        for rule in self.table.rules() {
            if let Some(keyword) = rule.keywords.iter().find(|k| desc.contains(k.as_str())) {
                return Categorization::new(
                    rule.category,
                    RULE_MATCH_CONFIDENCE,
                    format!("matched keyword '{}' for category {}", keyword, rule.category),
                );
            }
        }

        Categorization::new(Category::Uncategorized, RULE_MISS_CONFIDENCE, "no keyword match")
    }
}

impl Default for RuleCategorizer {
    fn default() -> Self {
        Self::new(tally_core::default_rule_table())
    }
}
