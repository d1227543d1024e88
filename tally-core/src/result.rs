//! Categorization results and their provenance

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::category::Category;
use crate::transaction::Transaction;

/// Output of either categorizer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Categorization {
    pub category: Category,
    /// Always within [0, 1]
    pub confidence: f64,
    pub reason: String,
}

impl Categorization {
    /// Clamps `confidence` into [0, 1]; NaN becomes 0.
    pub fn new(category: Category, confidence: f64, reason: impl Into<String>) -> Self {
        let confidence = if confidence.is_finite() { confidence.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            category,
            confidence,
            reason: reason.into(),
        }
    }

    pub fn uncategorized(confidence: f64, reason: impl Into<String>) -> Self {
        Self::new(Category::Uncategorized, confidence, reason)
    }
}

/// Which component produced the final category
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Source {
    #[serde(rename = "rule")]
    Rule,
    #[serde(rename = "llm")]
    Llm,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Rule => "rule",
            Source::Llm => "llm",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A categorization tagged with its source.
///
/// `rule_confidence` is `Some` exactly when `source == Source::Llm`. Both
/// are private so only the constructors can set them.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RoutedResult {
    pub category: Category,
    pub confidence: f64,
    pub reason: String,
    source: Source,
    #[serde(skip_serializing_if = "Option::is_none")]
    rule_confidence: Option<f64>,
}

impl RoutedResult {
    pub fn from_rule(rule: Categorization) -> Self {
        Self {
            category: rule.category,
            confidence: rule.confidence,
            reason: rule.reason,
            source: Source::Rule,
            rule_confidence: None,
        }
    }

    /// `rule_confidence` is the value that triggered escalation
    pub fn escalated(llm: Categorization, rule_confidence: f64) -> Self {
        Self {
            category: llm.category,
            confidence: llm.confidence,
            reason: llm.reason,
            source: Source::Llm,
            rule_confidence: Some(rule_confidence),
        }
    }

    pub fn source(&self) -> Source {
        self.source
    }

    /// Rule confidence that triggered escalation; `None` for rule results
    pub fn rule_confidence(&self) -> Option<f64> {
        self.rule_confidence
    }

    pub fn is_escalated(&self) -> bool {
        self.source == Source::Llm
    }
}

/// Input record paired with its routed result
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EnrichedTransaction {
    pub transaction: Transaction,
    pub result: RoutedResult,
}

impl EnrichedTransaction {
    pub fn category(&self) -> Category {
        self.result.category
    }
}
