//! Configuration for the Wayfinder resilience layer
//!
//! Every recognized option lives in a typed structure with a default,
//! and every loader validates before handing the configuration out.
//! Sources, lowest precedence first: built-in defaults, a TOML file,
//! then `WAYFINDER_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::context::ContextConfig;
use crate::error::{ResilienceError, ResilienceResult};
use crate::retry::{RetryCondition, RetryPolicy};

pub mod defaults;

pub use defaults::*;

/// Root configuration for a [`RecoveryOrchestrator`](crate::orchestrator::RecoveryOrchestrator)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Default retry policy for every operation key
    pub retry: RetryPolicy,

    /// Default circuit breaker settings for every operation key
    pub circuit_breaker: CircuitBreakerConfig,

    /// Error context limits
    pub context: ContextConfig,

    /// Number of error records kept in history
    pub history_capacity: usize,

    /// Emit tracing events for recoveries and transitions
    pub enable_logging: bool,

    /// Maintain aggregate counters
    pub enable_metrics: bool,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            context: ContextConfig::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            enable_logging: DEFAULT_ENABLE_LOGGING,
            enable_metrics: DEFAULT_ENABLE_METRICS,
        }
    }
}

impl ResilienceConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> ResilienceResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ResilienceError::serialization("parse configuration", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> ResilienceResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ResilienceError::configuration("file", format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load defaults overlaid with environment variables
    pub fn from_env() -> ResilienceResult<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `WAYFINDER_*` environment variables onto this configuration
    pub fn apply_env(&mut self) -> ResilienceResult<()> {
        if let Some(v) = env_parse::<u32>("MAX_RETRIES")? {
            self.retry.max_retries = v;
        }
        if let Some(v) = env_parse::<u64>("INITIAL_DELAY_MS")? {
            self.retry.initial_delay = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u64>("MAX_DELAY_MS")? {
            self.retry.max_delay = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<f64>("BACKOFF_MULTIPLIER")? {
            self.retry.backoff_multiplier = v;
        }
        if let Some(v) = env_parse::<bool>("JITTER")? {
            self.retry.jitter = v;
        }
        if let Some(v) = env_parse::<f64>("JITTER_FACTOR")? {
            self.retry.jitter_factor = v;
        }
        if let Some(v) = env_parse::<RetryCondition>("RETRY_CONDITION")? {
            self.retry.retry_condition = v;
        }
        if let Some(v) = env_parse::<u32>("FAILURE_THRESHOLD")? {
            self.circuit_breaker.failure_threshold = v;
        }
        if let Some(v) = env_parse::<u64>("RESET_TIMEOUT_MS")? {
            self.circuit_breaker.reset_timeout = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<usize>("HISTORY_CAPACITY")? {
            self.history_capacity = v;
        }
        if let Some(v) = env_parse::<bool>("ENABLE_LOGGING")? {
            self.enable_logging = v;
            self.circuit_breaker.enable_logging = v;
        }
        if let Some(v) = env_parse::<bool>("ENABLE_METRICS")? {
            self.enable_metrics = v;
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> ResilienceResult<()> {
        self.retry.validate()?;
        self.circuit_breaker.validate()?;
        self.context.validate()?;

        if self.history_capacity == 0 {
            return Err(ResilienceError::configuration(
                "history_capacity",
                "must be greater than zero",
            ));
        }

        Ok(())
    }
}

fn env_parse<T: FromStr>(suffix: &str) -> ResilienceResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    let name = format!("{}{}", ENV_PREFIX, suffix);
    match std::env::var(&name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ResilienceError::configuration(name, format!("invalid value '{}': {}", raw, e))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = ResilienceConfig::default();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(1000));
        assert_eq!(config.retry.max_delay, Duration::from_secs(30));
        assert_eq!(config.retry.backoff_multiplier, 2.0);
        assert!(config.retry.jitter);
        assert_eq!(config.retry.jitter_factor, 0.1);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.reset_timeout, Duration::from_secs(30));
        assert_eq!(config.history_capacity, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml() {
        let toml_content = r#"
history_capacity = 50
enable_metrics = false

[retry]
max_retries = 5
initial_delay = "250ms"
max_delay = "10s"
backoff_multiplier = 1.5
jitter = false
retry_condition = "on_network_error"

[circuit_breaker]
failure_threshold = 3
reset_timeout = "5s"
"#;
        let config = ResilienceConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.history_capacity, 50);
        assert!(!config.enable_metrics);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(250));
        assert_eq!(config.retry.max_delay, Duration::from_secs(10));
        assert!(!config.retry.jitter);
        assert_eq!(config.retry.retry_condition, RetryCondition::OnNetworkError);
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.circuit_breaker.reset_timeout, Duration::from_secs(5));
        // Untouched sections keep their defaults
        assert_eq!(config.context, ContextConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "[retry]\nmax_retries = 7\n").unwrap();

        let config = ResilienceConfig::from_file(file.path()).unwrap();
        assert_eq!(config.retry.max_retries, 7);
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let result = ResilienceConfig::from_file("/nonexistent/wayfinder.toml");
        assert!(matches!(result, Err(ResilienceError::Configuration { .. })));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ResilienceConfig::default();
        config.retry.jitter_factor = 1.5;
        assert!(config.validate().is_err());

        let mut config = ResilienceConfig::default();
        config.retry.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = ResilienceConfig::default();
        config.circuit_breaker.failure_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = ResilienceConfig::default();
        config.history_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = ResilienceConfig::default();
        config.retry.initial_delay = Duration::from_secs(60);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml_values_fail_validation() {
        let result = ResilienceConfig::from_toml_str("[retry]\njitter_factor = 2.0\n");
        assert!(matches!(result, Err(ResilienceError::Configuration { .. })));
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        std::env::set_var("WAYFINDER_MAX_RETRIES", "6");
        std::env::set_var("WAYFINDER_RESET_TIMEOUT_MS", "1500");
        std::env::set_var("WAYFINDER_JITTER", "false");

        let config = ResilienceConfig::from_env().unwrap();

        std::env::remove_var("WAYFINDER_MAX_RETRIES");
        std::env::remove_var("WAYFINDER_RESET_TIMEOUT_MS");
        std::env::remove_var("WAYFINDER_JITTER");

        assert_eq!(config.retry.max_retries, 6);
        assert_eq!(config.circuit_breaker.reset_timeout, Duration::from_millis(1500));
        assert!(!config.retry.jitter);
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_garbage() {
        std::env::set_var("WAYFINDER_FAILURE_THRESHOLD", "lots");
        let result = ResilienceConfig::from_env();
        std::env::remove_var("WAYFINDER_FAILURE_THRESHOLD");

        assert!(matches!(result, Err(ResilienceError::Configuration { .. })));
    }
}
