//! Sequential categorization pass: rules, then routing, per record in input order.

use tally_core::{EnrichedTransaction, RoutingSettings, Source, Transaction};

use crate::category_rules::RuleCategorizer;
use crate::llm_categorizer::{DisabledCategorizer, TransactionCategorizer};
use crate::routing::Router;

/// Counters reported at the end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub processed: usize,
    pub rule_accepted: usize,
    pub llm_escalations: usize,
    /// Escalations where the model could not be used, as counted by the categorizer
    pub llm_fallbacks: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub records: Vec<EnrichedTransaction>,
    pub stats: RunStats,
}

pub struct Pipeline {
    rules: RuleCategorizer,
    router: Router,
    llm: Box<dyn TransactionCategorizer>,
}

impl Pipeline {
    pub fn new(rules: RuleCategorizer, router: Router, llm: Box<dyn TransactionCategorizer>) -> Self {
        Self { rules, router, llm }
    }

    /// Build from validated settings; `llm = None` disables escalation.
    pub fn from_settings(settings: &RoutingSettings, llm: Option<Box<dyn TransactionCategorizer>>) -> Self {
        let rules = RuleCategorizer::new(settings.rules.clone());
        match llm {
            Some(llm) => Self::new(rules, Router::new(settings.threshold), llm),
            None => Self::new(
                rules,
                Router::rules_only(settings.threshold),
                Box::new(DisabledCategorizer::default()),
            ),
        }
    }

    pub fn categorize_one(&self, txn: &Transaction) -> EnrichedTransaction {
        let rule_result = self.rules.categorize(txn);
        let result = self.router.route(rule_result, txn, self.llm.as_ref());
        EnrichedTransaction {
            transaction: txn.clone(),
            result,
        }
    }

    /// Output order equals input order.
    pub fn run(&self, txns: &[Transaction]) -> PipelineOutput {
        let mut stats = RunStats::default();
        let mut records = Vec::with_capacity(txns.len());
        let fallbacks_before = self.llm.fallbacks();

        for txn in txns {
            let enriched = self.categorize_one(txn);
            stats.processed += 1;
            match enriched.result.source() {
                Source::Rule => stats.rule_accepted += 1,
                Source::Llm => stats.llm_escalations += 1,
            }
            records.push(enriched);
        }
        stats.llm_fallbacks = self.llm.fallbacks().saturating_sub(fallbacks_before);

        tracing::info!(
            processed = stats.processed,
            llm_escalations = stats.llm_escalations,
            llm_fallbacks = stats.llm_fallbacks,
            "categorization finished"
        );
        PipelineOutput { records, stats }
    }
}
