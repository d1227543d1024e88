use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tally_core::{
    AllowedCategories, CategoryRule, DEFAULT_THRESHOLD, RoutingSettings, RuleTable, default_rule_table,
};

use crate::llm::Provider;
use crate::state::{ensure_tally_home, tally_home};

/// Overrides `llm.enabled` when set
pub const LLM_ENABLED_ENV: &str = "TALLY_LLM_ENABLED";
/// Overrides `llm.model` when set
pub const LLM_MODEL_ENV: &str = "TALLY_LLM_MODEL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub routing: RoutingSection,
    /// Keyword rules in priority order; empty means the built-in table
    #[serde(default)]
    pub rules: Vec<RuleSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub enabled: bool,
    /// "openai" or "anthropic"
    pub provider: String,
    pub model: String,
    /// Provider default when unset
    pub base_url: Option<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Name of the environment variable holding the API key
    pub api_key_env: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            temperature: 0.0,
            timeout_secs: 30,
            api_key_env: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSection {
    pub threshold: f64,
    /// Empty means every category
    pub allowed_categories: Vec<String>,
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            allowed_categories: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSection {
    pub category: String,
    pub keywords: Vec<String>,
}

impl Config {
    /// Config written by `tally config init`: defaults with the built-in rules spelled out.
    pub fn starter() -> Self {
        let rules = default_rule_table()
            .rules()
            .iter()
            .map(|r| RuleSection {
                category: r.category.to_string(),
                keywords: r.keywords.clone(),
            })
            .collect();
        Self {
            rules,
            ..Self::default()
        }
    }

    /// Validate routing inputs. `threshold` overrides `[routing] threshold`.
    pub fn routing_settings(&self, threshold: Option<f64>) -> Result<RoutingSettings> {
        let allowed = if self.routing.allowed_categories.is_empty() {
            AllowedCategories::default()
        } else {
            AllowedCategories::from_names(&self.routing.allowed_categories)?
        };

        let rules = if self.rules.is_empty() {
            default_rule_table()
        } else {
            let parsed = self
                .rules
                .iter()
                .map(|r| CategoryRule::parse(&r.category, &r.keywords))
                .collect::<Result<Vec<_>, _>>()?;
            RuleTable::new(parsed)
        };

        let threshold = threshold.unwrap_or(self.routing.threshold);
        Ok(RoutingSettings::validate(threshold, allowed, rules)?)
    }

    pub fn provider(&self) -> Result<Provider> {
        self.llm.provider.parse()
    }

    /// Environment variable the API key is read from
    pub fn api_key_env(&self) -> Result<String> {
        if let Some(name) = self.llm.api_key_env.as_deref().filter(|n| !n.trim().is_empty()) {
            return Ok(name.trim().to_string());
        }
        Ok(self.provider()?.default_key_env().to_string())
    }

    /// `llm.enabled`, unless `TALLY_LLM_ENABLED` says otherwise
    pub fn llm_enabled(&self) -> bool {
        llm_enabled_with(self.llm.enabled, std::env::var(LLM_ENABLED_ENV).ok().as_deref())
    }

    pub fn model(&self) -> String {
        std::env::var(LLM_MODEL_ENV)
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.llm.model.clone())
    }
}

fn llm_enabled_with(configured: bool, env: Option<&str>) -> bool {
    match env.map(|v| v.trim().to_ascii_lowercase()) {
        None => configured,
        Some(v) if v.is_empty() => configured,
        Some(v) => matches!(v.as_str(), "1" | "true" | "t" | "yes" | "y" | "on"),
    }
}

/// Config location for writing; creates `~/.tally` if needed.
pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_tally_home()?.join("config.toml"))
}

/// `explicit` must exist; the default location may be absent (defaults apply).
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(p) => {
            if !p.exists() {
                bail!("config not found: {}", p.display());
            }
            read_config(p)
        }
        None => load_default_config(tally_home()),
    }
}

/// Reads `<home>/config.toml` without creating anything. No home or no
/// file means defaults.
fn load_default_config(home: Result<PathBuf>) -> Result<Config> {
    let home = match home {
        Ok(home) => home,
        Err(e) => {
            tracing::debug!(error = %e, "no tally home; using default config");
            return Ok(Config::default());
        }
    };
    let p = home.join("config.toml");
    if !p.exists() {
        tracing::debug!(path = %p.display(), "no config file; using defaults");
        return Ok(Config::default());
    }
    read_config(&p)
}

fn read_config(p: &Path) -> Result<Config> {
    let s = fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
    toml::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn save_config(cfg: &Config, path: &Path) -> Result<()> {
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn init_config(explicit: Option<&Path>) -> Result<()> {
    let p = match explicit {
        Some(p) => p.to_path_buf(),
        None => config_path()?,
    };
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config(&Config::starter(), &p)?;
    println!("Wrote {}", p.display());
    Ok(())
}
