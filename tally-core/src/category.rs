//! Closed set of spending categories

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Spending categories; `Uncategorized` is the fallback for anything unresolved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Food,
    Dining,
    Groceries,
    Transportation,
    Subscriptions,
    Utilities,
    Housing,
    Shopping,
    Entertainment,
    Health,
    Travel,
    Education,
    Income,
    Transfer,
    Uncategorized,
}

/// A category name outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown category '{0}'")]
pub struct UnknownCategory(pub String);

impl Category {
    pub const ALL: [Category; 15] = [
        Category::Food,
        Category::Dining,
        Category::Groceries,
        Category::Transportation,
        Category::Subscriptions,
        Category::Utilities,
        Category::Housing,
        Category::Shopping,
        Category::Entertainment,
        Category::Health,
        Category::Travel,
        Category::Education,
        Category::Income,
        Category::Transfer,
        Category::Uncategorized,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Food => "Food",
            Category::Dining => "Dining",
            Category::Groceries => "Groceries",
            Category::Transportation => "Transportation",
            Category::Subscriptions => "Subscriptions",
            Category::Utilities => "Utilities",
            Category::Housing => "Housing",
            Category::Shopping => "Shopping",
            Category::Entertainment => "Entertainment",
            Category::Health => "Health",
            Category::Travel => "Travel",
            Category::Education => "Education",
            Category::Income => "Income",
            Category::Transfer => "Transfer",
            Category::Uncategorized => "Uncategorized",
        }
    }

    /// Categories the smart budget trims instead of padding
    pub fn is_discretionary(&self) -> bool {
        matches!(self, Category::Dining | Category::Entertainment | Category::Shopping)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownCategory(wanted.to_string()))
    }
}
