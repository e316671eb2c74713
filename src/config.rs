use std::time::Duration;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Condish";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 120;
const DEFAULT_STREAM_TIMEOUT_SECS: u64 = 300;
const DEFAULT_RETRY_BASE_MS: u64 = 500;

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,condish_lib=debug,reqwest=warn,hyper=warn"
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Missing configuration value: {0}")]
    Missing(String),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
}

/// Runtime settings for the model client and stage execution.
#[derive(Debug, Clone)]
pub struct Settings {
    /// API key for the generative model. `None` until resolved from the environment.
    pub api_key: Option<String>,
    pub base_url: String,
    /// Model used for single-shot extraction stages.
    pub text_model: String,
    /// Model used for streaming image-generation stages.
    pub image_model: String,
    pub stage_timeout: Duration,
    pub stream_timeout: Duration,
    /// 0 keeps the historical no-retry behavior.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            stage_timeout: Duration::from_secs(DEFAULT_STAGE_TIMEOUT_SECS),
            stream_timeout: Duration::from_secs(DEFAULT_STREAM_TIMEOUT_SECS),
            max_retries: 0,
            retry_base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_MS),
        }
    }
}

impl Settings {
    /// Build settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup (environment, test map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let api_key = non_empty("GOOGLE_API_KEY").or_else(|| non_empty("GEMINI_API_KEY"));

        let base_url = non_empty("CONDISH_MODEL_BASE_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or(defaults.base_url);

        let stage_timeout = match non_empty("CONDISH_STAGE_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse_number("CONDISH_STAGE_TIMEOUT_SECS", &v)?),
            None => defaults.stage_timeout,
        };
        let stream_timeout = match non_empty("CONDISH_STREAM_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse_number("CONDISH_STREAM_TIMEOUT_SECS", &v)?),
            None => defaults.stream_timeout,
        };
        let max_retries = match non_empty("CONDISH_MAX_RETRIES") {
            Some(v) => parse_number::<u32>("CONDISH_MAX_RETRIES", &v)?,
            None => defaults.max_retries,
        };
        let retry_base_delay = match non_empty("CONDISH_RETRY_BASE_MS") {
            Some(v) => Duration::from_millis(parse_number("CONDISH_RETRY_BASE_MS", &v)?),
            None => defaults.retry_base_delay,
        };

        Ok(Self {
            api_key,
            base_url,
            text_model: non_empty("CONDISH_TEXT_MODEL").unwrap_or(defaults.text_model),
            image_model: non_empty("CONDISH_IMAGE_MODEL").unwrap_or(defaults.image_model),
            stage_timeout,
            stream_timeout,
            max_retries,
            retry_base_delay,
        })
    }

    /// The API key, or `ConfigError::Missing` when none was configured.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ConfigError::Missing("GOOGLE_API_KEY or GEMINI_API_KEY".into()))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    })
}
