//! Wayfinder resilience core
//!
//! Classifies failures of caller-supplied async operations, gates repeated
//! calls to failing dependencies with per-key circuit breakers, retries
//! transient failures with exponential backoff and jitter, and dispatches
//! fallback, degrade, abort and ignore recoveries while keeping a bounded
//! error history.

pub mod bootstrap;
pub mod circuit_breaker;
pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod failure;
pub mod handlers;
pub mod history;
pub mod observability;
pub mod orchestrator;
pub mod registry;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState};
pub use classifier::{Classification, ErrorClassifier, ErrorType, RecoveryStrategy, Severity};
pub use config::ResilienceConfig;
pub use context::{ContextManager, ErrorContext};
pub use error::{ResilienceError, ResilienceResult};
pub use failure::Failure;
pub use orchestrator::{ExecuteOptions, HandleOptions, RecoveryOrchestrator, RecoveryResult};
pub use retry::{RetryCondition, RetryPolicy, RetryStrategy};
