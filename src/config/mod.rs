//! # Configuration Management Module
//!
//! Loads and validates the TOML configuration used by the `sidequest` binary
//! and by anything embedding the library with file-based settings.
//!
//! ## Configuration Structure
//!
//! - [`StorageConfig`] - where the sled document store lives
//! - [`LoggingConfig`] - log level and optional log file
//! - [`AiConfig`] - chat-completion endpoint, model and API key lookup
//! - [`ProgressionConfig`] - engine behavior switches
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sidequest::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("sidequest.toml").await?;
//!     config.validate()?;
//!     println!("Data dir: {}", config.storage.data_dir);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [storage]
//! data_dir = "data/sidequest"
//!
//! [logging]
//! level = "info"
//!
//! [ai]
//! model = "gpt-4o-mini"
//! api_key_env = "OPENAI_API_KEY"
//!
//! [progression]
//! harden_sidequest_order = true
//! ```
//!
//! Every section and field has a default, so an empty file is a valid config.
//! The API key is never required at load time; it is only resolved when a
//! generation call is made.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::progression::EngineOptions;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub progression: ProgressionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory of the sled database.
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "data/sidequest".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Parsed level; unknown strings fall back to `info`.
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Inline key. Leave empty to read `api_key_env` instead.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_true() -> bool {
    true
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.7
}

fn default_timeout_seconds() -> u64 {
    60
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_endpoint(),
            api_key: String::new(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressionConfig {
    /// Reject sidequest completions that skip ahead of the current one.
    #[serde(default = "default_true")]
    pub harden_sidequest_order: bool,
    /// Delete a quest's sidequests together with the quest.
    #[serde(default = "default_true")]
    pub cascade_quest_delete: bool,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            harden_sidequest_order: true,
            cascade_quest_delete: true,
        }
    }
}

impl ProgressionConfig {
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            harden_sidequest_order: self.harden_sidequest_order,
            cascade_quest_delete: self.cascade_quest_delete,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;
        Self::from_toml(&content).map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub async fn load_or_default(path: &str) -> Result<Self> {
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Reject values the engine or AI client cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.storage.data_dir.trim().is_empty() {
            return Err(anyhow!("storage.data_dir must not be empty"));
        }
        if !(0.0..=2.0).contains(&self.ai.temperature) {
            return Err(anyhow!(
                "ai.temperature must be within 0.0..=2.0 (got {})",
                self.ai.temperature
            ));
        }
        if self.ai.max_tokens == 0 {
            return Err(anyhow!("ai.max_tokens must be greater than zero"));
        }
        if self.ai.timeout_seconds == 0 {
            return Err(anyhow!("ai.timeout_seconds must be greater than zero"));
        }
        if self.ai.endpoint.trim().is_empty() {
            return Err(anyhow!("ai.endpoint must not be empty"));
        }
        Ok(())
    }
}
