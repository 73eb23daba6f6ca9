//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for tern
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model to use
    pub model: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Maximum tokens per response
    pub max_tokens: Option<u32>,
    /// Anthropic API key (alternative to ANTHROPIC_API_KEY)
    pub api_key: Option<String>,
    /// Override the API endpoint
    pub base_url: Option<String>,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: Option<u64>,
    /// Signed-in user; chats are saved only when set
    pub user_id: Option<String>,
    /// Messages allowed per minute
    pub rate_limit_per_minute: Option<u32>,
    /// Retry once when the stream contains events tern does not understand
    pub retry_protocol_errors: Option<bool>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tern")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("TERN_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default path
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from a file, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), "Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to a file
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            model: Some(tern_ai::models::DEFAULT_MODEL_ID.to_string()),
            temperature: Some(0.0),
            request_timeout_secs: Some(120),
            rate_limit_per_minute: Some(crate::ratelimit::DEFAULT_LIMIT_PER_MINUTE),
            ..Default::default()
        };

        default_config.save_to(&path)?;
        Ok(path)
    }

    /// API key from config, then environment
    pub fn get_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# tern configuration file
# Place at ~/.config/tern/config.toml (Linux/Mac) or %APPDATA%\tern\config.toml (Windows)

# Model to use
model = "claude-3-haiku-20240307"

# Sampling temperature (0.0 - 1.0)
temperature = 0.0

# max_tokens = 1024
# base_url = "https://api.anthropic.com"
request_timeout_secs = 120

# Save chats for this user (omit to stay anonymous)
# user_id = "traveler"

# Messages allowed per minute
rate_limit_per_minute = 60

# Retry once on stream events tern does not understand
# retry_protocol_errors = false

# API key (optional - ANTHROPIC_API_KEY also works)
# api_key = "sk-ant-..."
"#
}
