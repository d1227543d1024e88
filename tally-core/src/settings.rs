//! Validated routing configuration.
//!
//! Everything here is checked once at startup; a bad threshold or an empty
//! category set stops the run before any record is read.

use std::collections::BTreeSet;
use thiserror::Error;

use crate::category::{Category, UnknownCategory};

pub const DEFAULT_THRESHOLD: f64 = 0.6;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("confidence threshold {0} is outside [0, 1]")]
    ThresholdOutOfRange(f64),
    #[error("allowed category list is empty")]
    NoAllowedCategories,
    #[error(transparent)]
    UnknownCategory(#[from] UnknownCategory),
    #[error("rule for {0} names a category that is not in the allowed list")]
    RuleCategoryNotAllowed(Category),
    #[error("rule for {0} has no keywords")]
    EmptyRule(Category),
}

/// Escalation cutoff in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(value: f64) -> Result<Self, ConfigError> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::ThresholdOutOfRange(value));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLD)
    }
}

/// Keywords for one category, lowercased and trimmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRule {
    pub category: Category,
    pub keywords: Vec<String>,
}

impl CategoryRule {
    pub fn new<I, S>(category: Category, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { category, keywords }
    }

    /// Build a rule from a category name as written in a config file
    pub fn parse<I, S>(category: &str, keywords: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let category: Category = category.parse()?;
        Ok(Self::new(category, keywords))
    }
}

/// Ordered rule list; the first matching category wins.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuleTable(Vec<CategoryRule>);

impl RuleTable {
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        Self(rules)
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Keyword table used when the config file defines no rules
pub fn default_rule_table() -> RuleTable {
    RuleTable::new(vec![
        CategoryRule::new(
            Category::Food,
            ["mcdonald", "chipotle", "restaurant", "cafe", "starbucks"],
        ),
        CategoryRule::new(
            Category::Transportation,
            ["uber", "lyft", "shell", "exxon", "chevron"],
        ),
        CategoryRule::new(Category::Subscriptions, ["netflix", "spotify", "amazon prime"]),
        CategoryRule::new(Category::Utilities, ["electric", "water", "internet", "verizon"]),
        CategoryRule::new(Category::Housing, ["rent", "mortgage"]),
    ])
}

/// Categories either categorizer may return. `Uncategorized` is always a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedCategories(BTreeSet<Category>);

impl AllowedCategories {
    pub fn new<I: IntoIterator<Item = Category>>(categories: I) -> Result<Self, ConfigError> {
        let mut set: BTreeSet<Category> = categories.into_iter().collect();
        set.remove(&Category::Uncategorized);
        if set.is_empty() {
            return Err(ConfigError::NoAllowedCategories);
        }
        set.insert(Category::Uncategorized);
        Ok(Self(set))
    }

    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, ConfigError> {
        let parsed = names
            .iter()
            .map(|n| n.as_ref().parse::<Category>())
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(parsed)
    }

    pub fn contains(&self, category: Category) -> bool {
        self.0.contains(&category)
    }

    /// Declaration order of `Category`
    pub fn iter(&self) -> impl Iterator<Item = Category> + '_ {
        self.0.iter().copied()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(|c| c.as_str()).collect()
    }
}

impl Default for AllowedCategories {
    fn default() -> Self {
        Self(Category::ALL.into_iter().collect())
    }
}

/// Threshold, allowed categories and keyword rules, cross-checked
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingSettings {
    pub threshold: Threshold,
    pub allowed: AllowedCategories,
    pub rules: RuleTable,
}

impl RoutingSettings {
    pub fn validate(
        threshold: f64,
        allowed: AllowedCategories,
        rules: RuleTable,
    ) -> Result<Self, ConfigError> {
        let threshold = Threshold::new(threshold)?;
        for rule in rules.rules() {
            if !allowed.contains(rule.category) {
                return Err(ConfigError::RuleCategoryNotAllowed(rule.category));
            }
            if rule.keywords.is_empty() {
                return Err(ConfigError::EmptyRule(rule.category));
            }
        }
        Ok(Self {
            threshold,
            allowed,
            rules,
        })
    }
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            threshold: Threshold::default(),
            allowed: AllowedCategories::default(),
            rules: default_rule_table(),
        }
    }
}
