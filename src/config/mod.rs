//! Configuration loading and validation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::fetch::{StatsClientConfig, Throttle};
use crate::models::ExtraField;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Remote stats API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API root URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    "https://wbapi.wbpjs.com".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("squad-rankings/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl ApiConfig {
    pub fn client_config(&self) -> StatsClientConfig {
        StatsClientConfig {
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.timeout_seconds),
            user_agent: self.user_agent.clone(),
        }
    }
}

/// Courtesy throttle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Pause after each player stats call
    #[serde(default = "default_member_delay")]
    pub member_delay_ms: u64,

    /// Pause after each squad
    #[serde(default = "default_squad_delay")]
    pub squad_delay_ms: u64,
}

fn default_member_delay() -> u64 {
    50
}

fn default_squad_delay() -> u64 {
    500
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            member_delay_ms: default_member_delay(),
            squad_delay_ms: default_squad_delay(),
        }
    }
}

impl ThrottleConfig {
    pub fn throttle(&self) -> Throttle {
        Throttle::new(
            Duration::from_millis(self.member_delay_ms),
            Duration::from_millis(self.squad_delay_ms),
        )
    }
}

/// What to record for a squad whose members all failed to produce stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ZeroMemberPolicy {
    /// Record an all-zero aggregate
    #[default]
    EmitZero,
    /// Leave the squad out of the snapshot
    Omit,
}

/// Aggregation configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Count fields summed into each squad aggregate besides wins/losses
    #[serde(default)]
    pub extra_fields: Vec<ExtraField>,

    #[serde(default)]
    pub zero_member_policy: ZeroMemberPolicy,
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where the snapshot is written
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub throttle: ThrottleConfig,

    #[serde(default)]
    pub aggregation: AggregationConfig,
}

fn default_output_path() -> PathBuf {
    PathBuf::from("squad_rankings.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            log_level: default_log_level(),
            api: ApiConfig::default(),
            throttle: ThrottleConfig::default(),
            aggregation: AggregationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load from `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "API timeout must be greater than 0".to_string(),
            ));
        }

        if url::Url::parse(&self.api.base_url).is_err() {
            return Err(ConfigError::ValidationError(format!(
                "API base URL is not a valid URL: {}",
                self.api.base_url
            )));
        }

        if self.output_path.file_name().is_none() {
            return Err(ConfigError::ValidationError(format!(
                "Output path must name a file: {:?}",
                self.output_path
            )));
        }

        let mut seen = Vec::new();
        for field in &self.aggregation.extra_fields {
            if seen.contains(field) {
                return Err(ConfigError::ValidationError(format!(
                    "Extra field listed twice: {}",
                    field
                )));
            }
            seen.push(*field);
        }

        Ok(())
    }
}
