//! Configuration management for turnstile.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{Result, TurnstileError};

/// Prefix for environment variable overrides, e.g. `TURNSTILE__LIMITER__MAX_TOKENS`.
const ENV_PREFIX: &str = "TURNSTILE";

/// Serialized tag of the policy `LimiterConfig::default()` selects.
const DEFAULT_POLICY_TAG: &str = "sliding_window";

/// Main configuration for a turnstile deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Which admission policy to run and its parameters
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Log output configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Admission policy selection.
///
/// Serialized with a `policy` tag:
///
/// ```yaml
/// policy: token_bucket
/// max_tokens: 50
/// refill_interval_millis: 200
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum LimiterConfig {
    SlidingWindow(SlidingWindowConfig),
    TokenBucket(TokenBucketConfig),
}

impl Default for LimiterConfig {
    fn default() -> Self {
        LimiterConfig::SlidingWindow(SlidingWindowConfig::default())
    }
}

impl LimiterConfig {
    /// Check every parameter of the selected policy.
    pub fn validate(&self) -> Result<()> {
        match self {
            LimiterConfig::SlidingWindow(config) => config.validate(),
            LimiterConfig::TokenBucket(config) => config.validate(),
        }
    }
}

/// Parameters of the sliding-window request-log limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlidingWindowConfig {
    /// Length of the trailing admission window in milliseconds
    #[serde(default = "default_window_size_millis")]
    pub window_size_millis: u64,

    /// Maximum admitted requests per client within one window
    #[serde(default = "default_max_requests_per_client")]
    pub max_requests_per_client: u64,
}

impl Default for SlidingWindowConfig {
    fn default() -> Self {
        Self {
            window_size_millis: default_window_size_millis(),
            max_requests_per_client: default_max_requests_per_client(),
        }
    }
}

impl SlidingWindowConfig {
    pub fn new(window_size_millis: u64, max_requests_per_client: u64) -> Self {
        Self {
            window_size_millis,
            max_requests_per_client,
        }
    }

    pub fn validate(&self) -> Result<()> {
        require_positive("window_size_millis", self.window_size_millis)?;
        require_positive("max_requests_per_client", self.max_requests_per_client)
    }
}

fn default_window_size_millis() -> u64 {
    1000
}

fn default_max_requests_per_client() -> u64 {
    5
}

/// Parameters of the token-bucket limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBucketConfig {
    /// Bucket capacity per client
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,

    /// Time needed to accrue one token, in milliseconds
    #[serde(default = "default_refill_interval_millis")]
    pub refill_interval_millis: u64,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            refill_interval_millis: default_refill_interval_millis(),
        }
    }
}

impl TokenBucketConfig {
    pub fn new(max_tokens: u64, refill_interval_millis: u64) -> Self {
        Self {
            max_tokens,
            refill_interval_millis,
        }
    }

    pub fn validate(&self) -> Result<()> {
        require_positive("max_tokens", self.max_tokens)?;
        require_positive("refill_interval_millis", self.refill_interval_millis)
    }
}

fn default_max_tokens() -> u64 {
    20
}

fn default_refill_interval_millis() -> u64 {
    1000
}

fn require_positive(field: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(TurnstileError::Config(format!(
            "{} must be greater than zero",
            field
        )));
    }
    Ok(())
}

/// Log output configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG` when set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
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

impl TurnstileConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading turnstile configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse config: {}", e)))?;
        config.limiter.validate()?;
        Ok(config)
    }

    /// Build the effective configuration from an optional file overlaid with
    /// `TURNSTILE__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // Environment-only overrides of policy fields still need the tag.
        let mut builder = config::Config::builder()
            .set_default("limiter.policy", DEFAULT_POLICY_TAG)?;
        if let Some(path) = path {
            info!(path = %path.display(), "Loading turnstile configuration");
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: TurnstileConfig = settings.try_deserialize()?;
        config.limiter.validate()?;
        Ok(config)
    }
}
