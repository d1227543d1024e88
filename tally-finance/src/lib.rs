//! tally-finance: keyword rules, confidence routing, LLM fallback, and spending reports

pub mod anomaly;
pub mod budget;
pub mod category_rules;
pub mod forecast;
pub mod llm_categorizer;
pub mod pipeline;
pub mod routing;
pub mod summary;

pub use anomaly::{AnomalyDetector, AnomalyFlag, AnomalyKind, AnomalyReport};
pub use budget::{BudgetConfig, BudgetLine, BudgetStatus, budget_status, load_budgets, smart_budget};
pub use category_rules::{RULE_MATCH_CONFIDENCE, RULE_MISS_CONFIDENCE, RuleCategorizer};
pub use forecast::{ForecastConfig, ForecastRow, Granularity, forecast_spending};
pub use llm_categorizer::{
    CompletionBackend, DisabledCategorizer, LLM_FALLBACK_CONFIDENCE, LlmCategorizer,
    TransactionCategorizer,
};
pub use pipeline::{Pipeline, PipelineOutput, RunStats};
pub use routing::Router;
pub use summary::SpendingSummary;
