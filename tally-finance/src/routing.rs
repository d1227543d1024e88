//! Confidence routing between the keyword rules and the LLM fallback.
//!
//! Rules first; a result below the threshold is replaced by one LLM call.
//! The rule confidence that triggered escalation is kept for audit.

use tally_core::{Categorization, RoutedResult, Threshold, Transaction};

use crate::llm_categorizer::TransactionCategorizer;

#[derive(Debug, Clone, Copy)]
pub struct Router {
    threshold: Threshold,
    escalate: bool,
}

impl Router {
    pub fn new(threshold: Threshold) -> Self {
        Self {
            threshold,
            escalate: true,
        }
    }

    /// LLM path disabled: every rule result is accepted as-is.
    pub fn rules_only(threshold: Threshold) -> Self {
        Self {
            threshold,
            escalate: false,
        }
    }

    /// Accept the rule result or delegate to `llm`. At most one `llm` call.
    pub fn route(
        &self,
        rule_result: Categorization,
        txn: &Transaction,
        llm: &dyn TransactionCategorizer,
    ) -> RoutedResult {
        if !self.escalate || rule_result.confidence >= self.threshold.value() {
            return RoutedResult::from_rule(rule_result);
        }

        tracing::debug!(
            row = txn.row,
            description = %txn.description,
            rule_confidence = rule_result.confidence,
            "escalating to llm"
        );
        let llm_result = llm.categorize(txn);
        RoutedResult::escalated(llm_result, rule_result.confidence)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(Threshold::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::cell::Cell;
    use tally_core::{Category, Source};

    /// Counts calls and returns a fixed result
    struct Fixed {
        result: Categorization,
        calls: Cell<usize>,
    }

    impl Fixed {
        fn new(result: Categorization) -> Self {
            Self {
                result,
                calls: Cell::new(0),
            }
        }
    }

    impl TransactionCategorizer for Fixed {
        fn categorize(&self, _txn: &Transaction) -> Categorization {
            self.calls.set(self.calls.get() + 1);
            self.result.clone()
        }
    }

    fn txn() -> Transaction {
        Transaction::new(0, NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(), "XYZ CORP PMT 99812", 120.0)
    }

    fn threshold(v: f64) -> Threshold {
        Threshold::new(v).unwrap()
    }

    #[test]
    fn test_confident_rule_is_accepted_without_llm_call() {
        let llm = Fixed::new(Categorization::new(Category::Shopping, 0.99, "llm"));
        let rule = Categorization::new(Category::Dining, 0.9, "matched keyword 'starbucks' for category Dining");
        let out = Router::new(threshold(0.6)).route(rule.clone(), &txn(), &llm);

        assert_eq!(out.source(), Source::Rule);
        assert_eq!(out.rule_confidence(), None);
        assert_eq!(out.category, rule.category);
        assert_eq!(out.confidence, rule.confidence);
        assert_eq!(out.reason, rule.reason);
        assert_eq!(llm.calls.get(), 0);
    }

    #[test]
    fn test_low_confidence_escalates() {
        let llm = Fixed::new(Categorization::uncategorized(0.0, "llm_error: timeout"));
        let rule = Categorization::uncategorized(0.3, "no keyword match");
        let out = Router::new(threshold(0.6)).route(rule, &txn(), &llm);

        assert_eq!(out.source(), Source::Llm);
        assert_eq!(out.category, Category::Uncategorized);
        assert_eq!(out.confidence, 0.0);
        assert_eq!(out.rule_confidence(), Some(0.3));
        assert_eq!(llm.calls.get(), 1);
    }

    #[test]
    fn test_high_threshold_escalates_a_match() {
        let llm = Fixed::new(Categorization::new(Category::Dining, 0.97, "coffee shop"));
        let rule = Categorization::new(Category::Dining, 0.9, "kw");
        let out = Router::new(threshold(0.95)).route(rule, &txn(), &llm);

        assert_eq!(out.source(), Source::Llm);
        assert_eq!(out.rule_confidence(), Some(0.9));
        assert_eq!(out.confidence, 0.97);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let llm = Fixed::new(Categorization::uncategorized(0.0, "x"));
        let rule = Categorization::new(Category::Dining, 0.9, "kw");
        let out = Router::new(threshold(0.9)).route(rule, &txn(), &llm);
        assert_eq!(out.source(), Source::Rule);
        assert_eq!(llm.calls.get(), 0);
    }

    #[test]
    fn test_rules_only_never_calls_llm() {
        let llm = Fixed::new(Categorization::new(Category::Shopping, 0.99, "llm"));
        let rule = Categorization::uncategorized(0.3, "no keyword match");
        let out = Router::rules_only(threshold(0.6)).route(rule, &txn(), &llm);

        assert_eq!(out.source(), Source::Rule);
        assert_eq!(out.confidence, 0.3);
        assert_eq!(out.rule_confidence(), None);
        assert_eq!(llm.calls.get(), 0);
    }
}
