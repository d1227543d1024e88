//! tally-core: transaction records, categories, and routing configuration

pub mod category;
pub mod result;
pub mod settings;
pub mod transaction;

pub use category::{Category, UnknownCategory};
pub use result::{Categorization, EnrichedTransaction, RoutedResult, Source};
pub use settings::{
    AllowedCategories, CategoryRule, ConfigError, DEFAULT_THRESHOLD, RoutingSettings, RuleTable,
    Threshold, default_rule_table,
};
pub use transaction::Transaction;
