//! LLM fallback categorizer.
//!
//! `categorize` never fails: transport errors, undecodable replies and
//! categories outside the allowed set all collapse into the same
//! low-confidence `Uncategorized` result.

use anyhow::Result;
use regex::Regex;
use serde::Deserialize;
use std::cell::Cell;
use std::sync::OnceLock;
use tally_core::{AllowedCategories, Categorization, Category, Transaction, UnknownCategory};
use thiserror::Error;

/// Confidence reported when the model could not be used
pub const LLM_FALLBACK_CONFIDENCE: f64 = 0.0;

/// Replies below this confidence are forced to `Uncategorized`
pub const LLM_MIN_CONFIDENCE: f64 = 0.5;

const SYSTEM_PROMPT: &str = "You label personal bank transactions with a spending category. \
Reply with a single JSON object and nothing else: no prose, no Markdown.";

/// Anything that can label a transaction without failing
pub trait TransactionCategorizer {
    fn categorize(&self, txn: &Transaction) -> Categorization;

    /// How many results so far were fallbacks rather than model answers
    fn fallbacks(&self) -> usize {
        0
    }
}

/// One chat-completion round trip: system + user prompt in, raw reply text out.
pub trait CompletionBackend {
    fn complete(&self, system: &str, user: &str) -> Result<String>;
}

impl<B: CompletionBackend + ?Sized> CompletionBackend for &B {
    fn complete(&self, system: &str, user: &str) -> Result<String> {
        (**self).complete(system, user)
    }
}

impl<B: CompletionBackend + ?Sized> CompletionBackend for Box<B> {
    fn complete(&self, system: &str, user: &str) -> Result<String> {
        (**self).complete(system, user)
    }
}

#[derive(Debug, Error)]
enum LlmError {
    #[error("transport: {0:#}")]
    Transport(anyhow::Error),
    #[error("invalid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    UnknownCategory(#[from] UnknownCategory),
    #[error("category {0} is not allowed")]
    CategoryNotAllowed(Category),
    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),
}

#[derive(Debug, Deserialize)]
struct Reply {
    category: String,
    confidence: f64,
    #[serde(default)]
    reason: Option<String>,
}

/// Categorizer backed by a language model
pub struct LlmCategorizer<B> {
    backend: B,
    allowed: AllowedCategories,
    fallbacks: Cell<usize>,
}

impl<B: CompletionBackend> LlmCategorizer<B> {
    pub fn new(backend: B, allowed: AllowedCategories) -> Self {
        Self {
            backend,
            allowed,
            fallbacks: Cell::new(0),
        }
    }

    pub fn prompt(&self, txn: &Transaction) -> String {
        let categories = self.allowed.names().join("\n");
        format!(
            "Transaction:\n\
             - Description: \"{}\"\n\
             - Amount: {:.2}\n\
             - Date: {}\n\n\
             Allowed categories:\n{}\n\n\
             Return {{\"category\": <one allowed category>, \"confidence\": <0 to 1>, \"reason\": <short explanation>}}.\n\
             Use \"Uncategorized\" when confidence is below {}.",
            txn.description,
            txn.amount,
            txn.date.format("%Y-%m-%d"),
            categories,
            LLM_MIN_CONFIDENCE,
        )
    }

    fn try_categorize(&self, txn: &Transaction) -> Result<Categorization, LlmError> {
        let raw = self
            .backend
            .complete(SYSTEM_PROMPT, &self.prompt(txn))
            .map_err(LlmError::Transport)?;
        self.decode(&raw)
    }

    fn decode(&self, raw: &str) -> Result<Categorization, LlmError> {
        let reply: Reply = serde_json::from_str(strip_code_fence(raw))?;

        if !reply.confidence.is_finite() || !(0.0..=1.0).contains(&reply.confidence) {
            return Err(LlmError::ConfidenceOutOfRange(reply.confidence));
        }
        let category: Category = reply.category.parse()?;
        if !self.allowed.contains(category) {
            return Err(LlmError::CategoryNotAllowed(category));
        }

        let category = if reply.confidence < LLM_MIN_CONFIDENCE {
            Category::Uncategorized
        } else {
            category
        };
        let reason = reply
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "no explanation provided".to_string());

        Ok(Categorization::new(category, reply.confidence, reason))
    }
}

impl<B: CompletionBackend> TransactionCategorizer for LlmCategorizer<B> {
    fn categorize(&self, txn: &Transaction) -> Categorization {
        match self.try_categorize(txn) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(description = %txn.description, error = %e, "llm categorization fell back");
                self.fallbacks.set(self.fallbacks.get() + 1);
                Categorization::uncategorized(LLM_FALLBACK_CONFIDENCE, format!("llm_error: {e}"))
            }
        }
    }

    fn fallbacks(&self) -> usize {
        self.fallbacks.get()
    }
}

/// Stand-in used when escalation is on but no model is configured
#[derive(Debug, Clone)]
pub struct DisabledCategorizer {
    reason: String,
    calls: Cell<usize>,
}

impl DisabledCategorizer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            calls: Cell::new(0),
        }
    }
}

impl Default for DisabledCategorizer {
    fn default() -> Self {
        Self::new("llm disabled")
    }
}

impl TransactionCategorizer for DisabledCategorizer {
    fn categorize(&self, _txn: &Transaction) -> Categorization {
        self.calls.set(self.calls.get() + 1);
        Categorization::uncategorized(LLM_FALLBACK_CONFIDENCE, format!("llm_error: {}", self.reason))
    }

    /// Every call is a fallback
    fn fallbacks(&self) -> usize {
        self.calls.get()
    }
}

/// Unwrap ```json ... ``` fences some models add despite instructions
fn strip_code_fence(raw: &str) -> &str {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    let trimmed = raw.trim();
    let fence = FENCE.get_or_init(|| Regex::new(r"(?s)^```[A-Za-z]*\s*(.*?)\s*```$").ok());
    match fence.as_ref().and_then(|re| re.captures(trimmed)) {
        Some(caps) => caps.get(1).map_or(trimmed, |m| m.as_str()),
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use chrono::NaiveDate;
    use std::cell::RefCell;

    /// Replays a canned reply and records prompts
    struct Canned {
        reply: Result<String, String>,
        prompts: RefCell<Vec<String>>,
    }

    impl Canned {
        fn ok(s: &str) -> Self {
            Self {
                reply: Ok(s.to_string()),
                prompts: RefCell::new(Vec::new()),
            }
        }

        fn err(s: &str) -> Self {
            Self {
                reply: Err(s.to_string()),
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl CompletionBackend for Canned {
        fn complete(&self, _system: &str, user: &str) -> Result<String> {
            self.prompts.borrow_mut().push(user.to_string());
            match &self.reply {
                Ok(s) => Ok(s.clone()),
                Err(e) => bail!("{e}"),
            }
        }
    }

    fn txn() -> Transaction {
        Transaction::new(0, NaiveDate::from_ymd_opt(2026, 1, 9).unwrap(), "XYZ CORP PMT 99812", 120.0)
    }

    fn categorizer(backend: Canned) -> LlmCategorizer<Canned> {
        let allowed =
            AllowedCategories::new([Category::Dining, Category::Utilities, Category::Shopping]).unwrap();
        LlmCategorizer::new(backend, allowed)
    }

    #[test]
    fn test_valid_reply() {
        let llm = categorizer(Canned::ok(
            r#"{"category": "Utilities", "confidence": 0.82, "reason": "payment to a utility"}"#,
        ));
        let out = llm.categorize(&txn());
        assert_eq!(out.category, Category::Utilities);
        assert_eq!(out.confidence, 0.82);
        assert_eq!(out.reason, "payment to a utility");
    }

    #[test]
    fn test_fenced_reply_and_missing_reason() {
        let llm = categorizer(Canned::ok("```json\n{\"category\": \"shopping\", \"confidence\": 0.7}\n```"));
        let out = llm.categorize(&txn());
        assert_eq!(out.category, Category::Shopping);
        assert_eq!(out.reason, "no explanation provided");
    }

    #[test]
    fn test_low_confidence_forces_uncategorized() {
        let llm = categorizer(Canned::ok(r#"{"category": "Dining", "confidence": 0.4, "reason": "maybe"}"#));
        let out = llm.categorize(&txn());
        assert_eq!(out.category, Category::Uncategorized);
        assert_eq!(out.confidence, 0.4);
    }

    #[test]
    fn test_transport_failure_falls_back() {
        let llm = categorizer(Canned::err("operation timed out"));
        let out = llm.categorize(&txn());
        assert_eq!(out.category, Category::Uncategorized);
        assert_eq!(out.confidence, LLM_FALLBACK_CONFIDENCE);
        assert_eq!(out.reason, "llm_error: transport: operation timed out");
    }

    #[test]
    fn test_malformed_json_falls_back() {
        let llm = categorizer(Canned::ok("Sure! The category is Dining."));
        let out = llm.categorize(&txn());
        assert_eq!(out.category, Category::Uncategorized);
        assert_eq!(out.confidence, 0.0);
        assert!(out.reason.starts_with("llm_error: invalid JSON"), "{}", out.reason);
    }

    #[test]
    fn test_unknown_category_falls_back() {
        let llm = categorizer(Canned::ok(r#"{"category": "Crypto", "confidence": 0.9, "reason": "x"}"#));
        let out = llm.categorize(&txn());
        assert_eq!(out.category, Category::Uncategorized);
        assert_eq!(out.reason, "llm_error: unknown category 'Crypto'");
    }

    #[test]
    fn test_category_outside_allowed_set_falls_back() {
        let llm = categorizer(Canned::ok(r#"{"category": "Travel", "confidence": 0.9, "reason": "x"}"#));
        let out = llm.categorize(&txn());
        assert_eq!(out.category, Category::Uncategorized);
        assert_eq!(out.reason, "llm_error: category Travel is not allowed");
    }

    #[test]
    fn test_missing_category_falls_back() {
        let llm = categorizer(Canned::ok(r#"{"confidence": 0.9, "reason": "x"}"#));
        let out = llm.categorize(&txn());
        assert_eq!(out.category, Category::Uncategorized);
        assert!(out.reason.contains("missing field `category`"), "{}", out.reason);
    }

    #[test]
    fn test_confidence_out_of_range_falls_back() {
        let llm = categorizer(Canned::ok(r#"{"category": "Dining", "confidence": 7, "reason": "x"}"#));
        let out = llm.categorize(&txn());
        assert_eq!(out.category, Category::Uncategorized);
        assert_eq!(out.reason, "llm_error: confidence 7 is outside [0, 1]");
    }

    #[test]
    fn test_prompt_carries_record_and_categories() {
        let backend = Canned::ok(r#"{"category": "Dining", "confidence": 0.9}"#);
        let llm = categorizer(backend);
        llm.categorize(&txn());
        let prompts = llm.backend.prompts.borrow();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("XYZ CORP PMT 99812"));
        assert!(prompts[0].contains("Amount: 120.00"));
        assert!(prompts[0].contains("2026-01-09"));
        assert!(prompts[0].contains("Dining\nUtilities\nShopping\nUncategorized"));
    }

    #[test]
    fn test_disabled_categorizer() {
        let disabled = DisabledCategorizer::default();
        let out = disabled.categorize(&txn());
        assert_eq!(out.category, Category::Uncategorized);
        assert_eq!(out.confidence, 0.0);
        assert_eq!(out.reason, "llm_error: llm disabled");
        assert_eq!(disabled.fallbacks(), 1);
    }

    #[test]
    fn test_fallbacks_are_counted_by_the_categorizer() {
        let llm = categorizer(Canned::ok(r#"{"category": "Dining", "confidence": 0.0, "reason": "llm_error: unsure"}"#));
        let out = llm.categorize(&txn());
        assert_eq!(out.confidence, 0.0);
        assert_eq!(out.reason, "llm_error: unsure");
        assert_eq!(llm.fallbacks(), 0);

        let llm = categorizer(Canned::err("connection reset"));
        llm.categorize(&txn());
        llm.categorize(&txn());
        assert_eq!(llm.fallbacks(), 2);
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json {\"a\":1}```"), "{\"a\":1}");
    }
}
