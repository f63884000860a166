use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::reply::minimum_reply_limit;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Social network
    pub twitter_access_token: String,
    pub twitter_api_url: String,

    // Storage backend
    pub storage_api_key: String,
    pub storage_api_url: String,
    pub storage_network: StorageNetwork,
    pub explorer_base_url: String,
    pub archive_password: Option<String>,
    pub archive_compression: bool,

    // Commentary
    pub llm_provider: LlmProvider,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,

    // Processors
    pub mentions_enabled: bool,
    pub mentions_poll_interval: Duration,
    pub mentions_batch_size: usize,
    pub dms_enabled: bool,
    pub dms_poll_interval: Duration,
    pub max_thread_depth: usize,
    pub reply_char_limit: usize,

    // Database
    pub database_path: PathBuf,
}

/// Target network of the permanent-storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageNetwork {
    Mainnet,
    Taurus,
}

impl StorageNetwork {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Taurus => "taurus",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// Commentary disabled; replies always use the plain link text.
    None,
    OpenAi,
    Anthropic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// Read `LOG_FORMAT` on its own, so logging can start before the rest
    /// of the configuration is loaded.
    #[must_use]
    pub fn from_env() -> Self {
        parse_log_format(&env_or_default("LOG_FORMAT", "pretty"))
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Social network
            twitter_access_token: required_env("TWITTER_ACCESS_TOKEN")?,
            twitter_api_url: env_or_default("TWITTER_API_URL", "https://api.x.com"),

            // Storage backend
            storage_api_key: required_env("STORAGE_API_KEY")?,
            storage_api_url: env_or_default("STORAGE_API_URL", "https://ipfs.autonomys.xyz"),
            storage_network: parse_storage_network(&env_or_default("STORAGE_NETWORK", "mainnet"))?,
            explorer_base_url: env_or_default("EXPLORER_BASE_URL", "https://astral.autonomys.xyz"),
            archive_password: optional_env("ARCHIVE_PASSWORD"),
            archive_compression: parse_env_bool("ARCHIVE_COMPRESSION", true)?,

            // Commentary
            llm_provider: parse_llm_provider(&env_or_default("LLM_PROVIDER", "none"))?,
            openai_api_key: optional_env("OPENAI_API_KEY"),
            openai_model: env_or_default("OPENAI_MODEL", "gpt-4"),
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            anthropic_model: env_or_default("ANTHROPIC_MODEL", "claude-3-sonnet-20240229"),

            // Processors
            mentions_enabled: parse_env_bool("MENTIONS_ENABLED", true)?,
            mentions_poll_interval: Duration::from_secs(parse_env_u64(
                "MENTIONS_POLL_INTERVAL_SECS",
                900,
            )?),
            mentions_batch_size: parse_env_usize("MENTIONS_BATCH_SIZE", 10)?,
            dms_enabled: parse_env_bool("DMS_ENABLED", true)?,
            dms_poll_interval: Duration::from_secs(parse_env_u64("DMS_POLL_INTERVAL_SECS", 900)?),
            max_thread_depth: parse_env_usize("MAX_THREAD_DEPTH", 10)?,
            reply_char_limit: parse_env_usize("REPLY_CHAR_LIMIT", 280)?,

            // Database
            database_path: PathBuf::from(env_or_default(
                "DATABASE_PATH",
                "./data/archive-bot.sqlite",
            )),

            // Logging
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.twitter_access_token.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "TWITTER_ACCESS_TOKEN".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.storage_api_key.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "STORAGE_API_KEY".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        match self.llm_provider {
            LlmProvider::OpenAi if self.openai_api_key.is_none() => {
                return Err(ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()));
            }
            LlmProvider::Anthropic if self.anthropic_api_key.is_none() => {
                return Err(ConfigError::MissingEnvVar("ANTHROPIC_API_KEY".to_string()));
            }
            _ => {}
        }
        if self.mentions_batch_size == 0 || self.mentions_batch_size > 100 {
            return Err(ConfigError::InvalidValue {
                name: "MENTIONS_BATCH_SIZE".to_string(),
                message: "must be between 1 and 100".to_string(),
            });
        }
        if self.max_thread_depth == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MAX_THREAD_DEPTH".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        let minimum = minimum_reply_limit(&self.explorer_base_url, self.storage_network);
        if self.reply_char_limit < minimum {
            return Err(ConfigError::InvalidValue {
                name: "REPLY_CHAR_LIMIT".to_string(),
                message: format!("must be at least {minimum} to fit a handle and the archive link"),
            });
        }
        if self.mentions_poll_interval.is_zero() || self.dms_poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "POLL_INTERVAL_SECS".to_string(),
                message: "poll intervals must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Configuration with every field populated, for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            twitter_access_token: "test-token".to_string(),
            twitter_api_url: "http://127.0.0.1:9".to_string(),
            storage_api_key: "test-key".to_string(),
            storage_api_url: "http://127.0.0.1:9".to_string(),
            storage_network: StorageNetwork::Taurus,
            explorer_base_url: "https://astral.autonomys.xyz".to_string(),
            archive_password: None,
            archive_compression: true,
            llm_provider: LlmProvider::None,
            openai_api_key: None,
            openai_model: "gpt-4".to_string(),
            anthropic_api_key: None,
            anthropic_model: "claude-3-sonnet-20240229".to_string(),
            mentions_enabled: true,
            mentions_poll_interval: Duration::from_secs(900),
            mentions_batch_size: 10,
            dms_enabled: true,
            dms_poll_interval: Duration::from_secs(900),
            max_thread_depth: 10,
            reply_char_limit: 280,
            database_path: PathBuf::from("./data/test.sqlite"),
        }
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}

fn parse_storage_network(value: &str) -> Result<StorageNetwork, ConfigError> {
    match value.to_lowercase().as_str() {
        "mainnet" => Ok(StorageNetwork::Mainnet),
        "taurus" => Ok(StorageNetwork::Taurus),
        _ => Err(ConfigError::InvalidValue {
            name: "STORAGE_NETWORK".to_string(),
            message: format!("must be 'mainnet' or 'taurus', got '{value}'"),
        }),
    }
}

fn parse_llm_provider(value: &str) -> Result<LlmProvider, ConfigError> {
    match value.to_lowercase().as_str() {
        "none" | "off" | "disabled" => Ok(LlmProvider::None),
        "openai" => Ok(LlmProvider::OpenAi),
        "anthropic" => Ok(LlmProvider::Anthropic),
        _ => Err(ConfigError::InvalidValue {
            name: "LLM_PROVIDER".to_string(),
            message: format!("must be 'none', 'openai' or 'anthropic', got '{value}'"),
        }),
    }
}

fn parse_log_format(value: &str) -> LogFormat {
    match value.to_lowercase().as_str() {
        "json" | "structured" => LogFormat::Json,
        _ => LogFormat::Pretty,
    }
}
