//! Error types for the Wayfinder resilience layer
//!
//! Two kinds of error flow through this crate:
//!
//! - [`Failure`](crate::failure::Failure): what a caller-supplied operation
//!   reports. It is classified, retried and recorded.
//! - [`ResilienceError`]: what the resilience layer itself reports back
//!   from `execute`. Each variant names one outcome (breaker open, retries
//!   exhausted, aborted by classification, timed out, ...).
//!
//! `RecoveryOrchestrator::handle_error` never returns an error; it reports
//! outcomes through `RecoveryResult` instead.

pub mod constructors;
pub mod types;

pub use types::{ResilienceError, ResilienceResult};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakerState;
    use crate::classifier::ErrorType;
    use crate::failure::Failure;
    use std::time::Duration;

    #[test]
    fn test_circuit_open_is_distinguishable() {
        let err = ResilienceError::CircuitOpen {
            key: "tiles".to_string(),
            state: CircuitBreakerState::Open,
        };
        assert!(err.is_circuit_open());
        assert!(!err.is_retries_exhausted());
        assert_eq!(err.to_string(), "Circuit breaker 'tiles' is open");
        assert!(err.failure().is_none());
    }

    #[test]
    fn test_retries_exhausted_carries_attempts_and_source() {
        let err = ResilienceError::RetriesExhausted {
            key: "fetch".to_string(),
            attempts: 4,
            source: Failure::network("offline"),
        };
        assert!(err.is_retries_exhausted());
        assert_eq!(err.attempts(), Some(4));
        assert_eq!(err.failure(), Some(&Failure::network("offline")));
        assert_eq!(err.to_failure(), Failure::network("offline"));
    }

    #[test]
    fn test_aborted_and_timeout_helpers() {
        let aborted = ResilienceError::Aborted {
            key: "init".to_string(),
            error_type: ErrorType::Runtime,
            source: Failure::type_error("x is undefined"),
        };
        assert!(aborted.is_aborted());

        let timeout = ResilienceError::Timeout {
            operation: "bootstrap".to_string(),
            duration: Duration::from_millis(50),
        };
        assert!(timeout.is_timeout());
        assert_eq!(timeout.to_failure().name, "TimeoutError");
    }
}
