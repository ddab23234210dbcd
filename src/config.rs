//! Settings read from the environment (after `.env` has been loaded).

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::llm::RetryPolicy;

pub const DEFAULT_CRFM_URL: &str = "https://crfm-models.stanford.edu";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";
pub const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_LLAMA_URL: &str = "http://127.0.0.1:8080";

#[derive(Debug, Clone)]
pub struct Settings {
    /// Root holding `conditions/`, `results/` and the story templates.
    pub data_dir: PathBuf,
    /// Directory of instruction texts (`evaluate.txt`, `grade.txt`, ...).
    pub prompt_dir: PathBuf,
    pub crfm_api_key: Option<String>,
    pub crfm_url: String,
    pub openai_api_key: Option<String>,
    pub openai_url: String,
    pub anthropic_api_key: Option<String>,
    pub anthropic_url: String,
    pub llama_url: String,
    pub request_timeout: Duration,
    pub max_attempts: u32,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let request_timeout = match get("BIGTOM_REQUEST_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(
                v.parse()
                    .with_context(|| format!("BIGTOM_REQUEST_TIMEOUT_SECS must be seconds, got '{v}'"))?,
            ),
            None => Duration::from_secs(180),
        };
        let max_attempts = match get("BIGTOM_MAX_RETRIES") {
            Some(v) => v
                .parse()
                .with_context(|| format!("BIGTOM_MAX_RETRIES must be a count, got '{v}'"))?,
            None => RetryPolicy::default().max_attempts,
        };

        Ok(Self {
            data_dir: PathBuf::from(or("BIGTOM_DATA_DIR", "data")),
            prompt_dir: PathBuf::from(or("BIGTOM_PROMPT_DIR", "prompts")),
            crfm_api_key: get("CRFM_API_KEY"),
            crfm_url: or("CRFM_URL", DEFAULT_CRFM_URL),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_url: or("OPENAI_BASE_URL", DEFAULT_OPENAI_URL),
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            anthropic_url: or("ANTHROPIC_BASE_URL", DEFAULT_ANTHROPIC_URL),
            llama_url: or("LLAMA_SERVER_URL", DEFAULT_LLAMA_URL),
            request_timeout,
            max_attempts,
        })
    }

    pub fn conditions_dir(&self) -> PathBuf {
        self.data_dir.join("conditions")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.data_dir.join("results")
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            ..RetryPolicy::default()
        }
    }
}
