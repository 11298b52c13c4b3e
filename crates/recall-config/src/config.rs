use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Top-level TOML config. Every section and field has a default, so an
/// absent or partial file is always usable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentConfig,
    pub history: HistoryConfig,
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Classifications at or above this confidence go to the classified
    /// category; below it they are held for review.
    pub confidence_threshold: f64,
    /// Maximum model invocations per inbound message.
    pub round_cap: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            round_cap: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Messages kept on disk per session.
    pub persist_limit: usize,
    /// Messages replayed to the model per invocation.
    pub model_window: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            persist_limit: 20,
            model_window: 10,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// OpenAI-compatible API base URL.
    ///
    /// Examples:
    /// - OpenAI:       https://api.openai.com/v1
    /// - Groq:         https://api.groq.com/openai/v1
    /// - Local Ollama: http://localhost:11434/v1
    pub base_url: String,
    /// API key. The RECALL_API_KEY environment variable overrides this.
    pub api_key: String,
    /// Comma-separated model list for failover.
    ///
    /// First model is primary; on 429/quota exhaustion, auto-switch to next.
    pub models: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            models: "gpt-4o-mini".to_string(),
        }
    }
}

impl ModelConfig {
    pub fn model_list(&self) -> Vec<String> {
        self.models
            .split(',')
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn redacted_api_key(&self) -> String {
        mask_api_key(&self.api_key)
    }
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.redacted_api_key())
            .field("models", &self.models)
            .finish()
    }
}

impl Config {
    /// Load config from the default XDG location.
    ///
    /// Returns `Default` if the file does not exist or if the config
    /// directory cannot be determined (e.g., no HOME in containers).
    pub fn load() -> Result<Self> {
        let path = match crate::paths::config_file_path() {
            Some(path) => path,
            None => return Ok(Self::with_env_overrides(Self::default())),
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::with_env_overrides(Self::default()));
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        Ok(Self::with_env_overrides(config))
    }

    fn with_env_overrides(mut config: Self) -> Self {
        if let Ok(key) = std::env::var("RECALL_API_KEY")
            && !key.is_empty()
        {
            config.model.api_key = key;
        }
        config
    }
}

fn mask_api_key(api_key: &str) -> String {
    if api_key.is_empty() {
        return String::new();
    }

    let char_count = api_key.chars().count();
    let prefix: String = api_key.chars().take(3).collect();
    let suffix: String = api_key.chars().skip(char_count.saturating_sub(4)).collect();

    if char_count <= 4 {
        format!("***{suffix}")
    } else {
        format!("{prefix}...{suffix}")
    }
}
