//! Layered configuration: defaults, TOML file, `SYNCWATCH_*` environment, CLI.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::error::InputError;

/// Config file read from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "syncwatch.toml";
pub const ENV_PREFIX: &str = "SYNCWATCH_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    #[error("config file not found: {0}")]
    MissingFile(PathBuf),

    #[error("failed to read token file {path}: {source}")]
    TokenFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(#[from] InputError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub polling: PollConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Bearer token. Takes precedence over `token_file`.
    pub token: Option<String>,
    pub token_file: Option<PathBuf>,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            token: None,
            token_file: None,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Delay between status requests for one job.
    pub interval_ms: u64,
    /// Wall-clock limit after which a loop stops watching its job.
    pub max_duration_secs: u64,
    /// How long a success stays displayed before it is cleared.
    pub success_display_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2_000,
            max_duration_secs: 300,
            success_display_ms: 3_000,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }

    pub fn success_display(&self) -> Duration {
        Duration::from_millis(self.success_display_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub json: bool,
    pub verbose: bool,
}

impl AppConfig {
    /// Load configuration. Later sources override earlier ones:
    /// defaults, `config_file` (or `syncwatch.toml` if present), environment,
    /// then `overrides` (typically the parsed CLI arguments).
    pub fn new<T: Serialize>(
        config_file: Option<&Path>,
        overrides: Option<&T>,
    ) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        figment = match config_file {
            Some(path) if !path.exists() => {
                return Err(ConfigError::MissingFile(path.to_path_buf()));
            }
            Some(path) => figment.merge(Toml::file(path)),
            None => figment.merge(Toml::file(DEFAULT_CONFIG_FILE)),
        };

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        let config: AppConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), InputError> {
        let base_url = self.api.base_url.trim();
        if base_url.is_empty() {
            return Err(InputError::Empty {
                field: "api.base_url",
            });
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(InputError::Invalid {
                field: "api.base_url",
                reason: format!("{base_url:?} must start with http:// or https://"),
            });
        }

        check_range("api.request_timeout_secs", self.api.request_timeout_secs, 1, 300)?;
        check_range("polling.interval_ms", self.polling.interval_ms, 100, 60_000)?;
        check_range(
            "polling.max_duration_secs",
            self.polling.max_duration_secs,
            1,
            86_400,
        )?;
        check_range(
            "polling.success_display_ms",
            self.polling.success_display_ms,
            0,
            600_000,
        )?;
        Ok(())
    }

    /// Render the effective configuration as TOML, with the token redacted.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        let mut shown = self.clone();
        if shown.api.token.is_some() {
            shown.api.token = Some("<redacted>".to_string());
        }
        toml::to_string_pretty(&shown)
    }
}

impl ApiConfig {
    /// The bearer token: `token` if set, else the trimmed contents of `token_file`.
    pub fn resolve_token(&self) -> Result<Option<String>, ConfigError> {
        if let Some(token) = self.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            return Ok(Some(token.to_string()));
        }

        let Some(path) = &self.token_file else {
            return Ok(None);
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::TokenFile {
            path: path.clone(),
            source,
        })?;
        let token = raw.trim();
        Ok((!token.is_empty()).then(|| token.to_string()))
    }
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), InputError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(InputError::out_of_range(field, min, max, value))
    }
}
