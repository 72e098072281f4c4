//! Default configuration values for Wayfinder
//!
//! This module centralizes all default values to make them easy to find and modify.

// Retry defaults
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_JITTER_ENABLED: bool = true;
pub const DEFAULT_JITTER_FACTOR: f64 = 0.1;

// Circuit breaker defaults
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_RESET_TIMEOUT_MS: u64 = 30_000;

// Error context defaults
pub const DEFAULT_MAX_CONTEXT_DEPTH: usize = 10;
pub const DEFAULT_MAX_CONTEXT_SIZE: usize = 64 * 1024; // 64KB of serialized data
pub const REDACTED_PLACEHOLDER: &str = "[REDACTED]";
pub const SENSITIVE_KEYS: &[&str] = &["password", "token", "key", "secret", "auth", "credential"];

// History defaults
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

// Orchestrator defaults
pub const DEFAULT_BREAKER_KEY: &str = "default";
pub const DEFAULT_ENABLE_LOGGING: bool = true;
pub const DEFAULT_ENABLE_METRICS: bool = true;

// Environment variable prefix
pub const ENV_PREFIX: &str = "WAYFINDER_";
