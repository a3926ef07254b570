//! Configuration management for creditgate.
//!
//! Configuration is layered: built-in defaults, an optional YAML file,
//! `CREDITGATE__SECTION__KEY` environment variables, and finally the
//! well-known variables `API_KEY`, `OPENAI_API_KEY`, `HOST` and `PORT`.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::{CreditGateError, Result};

/// Prefix for structured environment overrides.
const ENV_PREFIX: &str = "CREDITGATE";

/// Main configuration for the creditgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreditGateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Credit ledger configuration
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Caller authentication
    #[serde(default)]
    pub auth: AuthConfig,

    /// Image description collaborator
    #[serde(default)]
    pub vision: VisionConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Largest accepted request body, in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

/// Credit ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Path to the SQLite database holding `user_credits`
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Allowance granted to a user on first contact
    #[serde(default = "default_credits")]
    pub default_credits: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            default_credits: default_credits(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("credits.db")
}

fn default_credits() -> i64 {
    10
}

/// Caller authentication configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared key expected in `X-Api-Key`. The check is skipped when unset.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Configuration of the OpenAI-compatible vision endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    /// Bearer token for the completion API
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_vision_base_url")]
    pub base_url: String,

    #[serde(default = "default_vision_model")]
    pub model: String,

    /// Completion token cap; hitting it means the image was too big
    #[serde(default = "default_vision_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_vision_timeout")]
    pub timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_vision_base_url(),
            model: default_vision_model(),
            max_tokens: default_vision_max_tokens(),
            timeout_secs: default_vision_timeout(),
        }
    }
}

fn default_vision_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_vision_model() -> String {
    "gpt-4o-2024-08-06".to_string()
}

fn default_vision_max_tokens() -> u32 {
    500
}

fn default_vision_timeout() -> u64 {
    60
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl CreditGateConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a standalone YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: CreditGateConfig =
            serde_yaml::from_str(yaml).map_err(|e| CreditGateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Build the layered configuration from an optional file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    /// Like [`CreditGateConfig::load`], resolving well-known variables through `lookup`.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }

        builder = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .set_override_option("auth.api_key", lookup("API_KEY"))?
            .set_override_option("vision.api_key", lookup("OPENAI_API_KEY"))?;

        if let (Some(host), Some(port)) = (lookup("HOST"), lookup("PORT")) {
            builder = builder.set_override("server.http_addr", format!("{}:{}", host, port))?;
        }

        let config: CreditGateConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.ledger.default_credits < 0 {
            return Err(CreditGateError::Config(format!(
                "ledger.default_credits must not be negative, got {}",
                self.ledger.default_credits
            )));
        }
        if self.vision.max_tokens == 0 {
            return Err(CreditGateError::Config(
                "vision.max_tokens must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
