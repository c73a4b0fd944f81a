//! Configuration loader and validator for the content engine.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub analytics: Analytics,
    pub llm: Llm,
    pub ranking: Ranking,
    pub scrape: Scrape,
    pub chat: Chat,
}

/// Search-analytics API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Analytics {
    /// Default site property ("sc-domain:example.com" or "https://example.com/").
    pub site: String,
    /// Bearer token; may be empty here and supplied via ANALYTICS_BEARER_TOKEN.
    pub token: String,
    /// Service identity shown in permission-failure remediation messages.
    pub identity: String,
}

/// Text-generation API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Llm {
    /// API key; may be empty here and supplied via LLM_API_KEY.
    pub api_key: String,
    pub model: String,
    pub version: String,
}

/// Opportunity selection thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ranking {
    pub min_impressions: u64,
    pub max_opportunities: usize,
}

/// Page-content fetcher settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Scrape {
    pub max_pages: usize,
    pub delay_ms: u64,
}

/// Chat context and article-resolution heuristics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    /// Minimum keyword-overlap score for a semantic article match.
    pub min_match_score: u32,
    /// Number of prior exchanges replayed into each chat turn.
    pub history_window: usize,
    /// Top-queries cap inside the context blob.
    pub context_queries: usize,
    /// Recently generated articles listed in the context blob.
    pub context_articles: usize,
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.analytics.identity.trim().is_empty() {
        return Err(ConfigError::Invalid("analytics.identity must be non-empty"));
    }

    if cfg.llm.model.trim().is_empty() {
        return Err(ConfigError::Invalid("llm.model must be non-empty"));
    }
    if cfg.llm.version.trim().is_empty() {
        return Err(ConfigError::Invalid("llm.version must be non-empty"));
    }

    if cfg.ranking.max_opportunities == 0 {
        return Err(ConfigError::Invalid("ranking.max_opportunities must be > 0"));
    }

    if cfg.scrape.max_pages == 0 {
        return Err(ConfigError::Invalid("scrape.max_pages must be > 0"));
    }

    if cfg.chat.history_window == 0 {
        return Err(ConfigError::Invalid("chat.history_window must be > 0"));
    }

    Ok(())
}

/// Example YAML with production defaults.
pub fn example() -> &'static str {
    r#"analytics:
  site: "sc-domain:example.com"
  token: ""
  identity: "analytics-reader@content-engine.example.com"

llm:
  api_key: ""
  model: "claude-opus-4-5-20251101"
  version: "2023-06-01"

ranking:
  min_impressions: 100
  max_opportunities: 25

scrape:
  max_pages: 20
  delay_ms: 500

chat:
  min_match_score: 1
  history_window: 10
  context_queries: 20
  context_articles: 5
"#
}
