//! Core error types for Wayfinder
//!
//! This module contains the ResilienceError enum and the associated
//! Result alias.

use std::time::Duration;
use thiserror::Error;

use crate::circuit_breaker::CircuitBreakerState;
use crate::classifier::ErrorType;
use crate::failure::Failure;

/// Error type returned by the resilience layer
///
/// Every way a guarded call can fail has its own variant so callers can
/// tell "breaker open", "retries exhausted" and "classification aborted"
/// apart without looking at message text.
#[derive(Error, Debug, Clone)]
pub enum ResilienceError {
    // Gating
    #[error("Circuit breaker '{key}' is {state}")]
    CircuitOpen {
        key: String,
        state: CircuitBreakerState,
    },

    // Retry outcomes
    #[error("Retries exhausted for '{key}' after {attempts} attempts: {source}")]
    RetriesExhausted {
        key: String,
        attempts: u32,
        #[source]
        source: Failure,
    },

    #[error("Retry stopped for '{key}' after {attempts} attempts: {source}")]
    NotRetryable {
        key: String,
        attempts: u32,
        #[source]
        source: Failure,
    },

    // Classification outcomes
    #[error("Operation '{key}' aborted ({error_type}): {source}")]
    Aborted {
        key: String,
        error_type: ErrorType,
        #[source]
        source: Failure,
    },

    #[error("Operation timed out: {operation} after {duration:?}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("Operation failed: {0}")]
    Operation(#[from] Failure),

    // Configuration & context
    #[error("Configuration error in {component}: {message}")]
    Configuration { component: String, message: String },

    #[error("Serialization operation '{operation}' failed: {message}")]
    Serialization { operation: String, message: String },

    #[error("Error context not found: {id}")]
    ContextNotFound { id: String },
}

pub type ResilienceResult<T> = std::result::Result<T, ResilienceError>;
