//! Constructor methods and inspection helpers for ResilienceError

use super::types::ResilienceError;
use crate::failure::Failure;

impl ResilienceError {
    /// Create a configuration error with component and message
    ///
    /// # Examples
    /// ```rust
    /// use wayfinder_core::error::ResilienceError;
    ///
    /// let err = ResilienceError::configuration("retry.jitter_factor", "must be within [0, 1]");
    /// assert!(err.to_string().contains("retry.jitter_factor"));
    /// ```
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        ResilienceError::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a serialization error from any displayable source
    pub fn serialization(operation: impl Into<String>, source: impl std::fmt::Display) -> Self {
        ResilienceError::Serialization {
            operation: operation.into(),
            message: source.to_string(),
        }
    }

    /// True when the call was rejected by an open circuit breaker
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen { .. })
    }

    /// True when the retry budget was used up
    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, ResilienceError::RetriesExhausted { .. })
    }

    /// True when the classification decided to abort
    pub fn is_aborted(&self) -> bool {
        matches!(self, ResilienceError::Aborted { .. })
    }

    /// True when a timeout race was lost
    pub fn is_timeout(&self) -> bool {
        matches!(self, ResilienceError::Timeout { .. })
    }

    /// Number of attempts made, where the variant tracks it
    pub fn attempts(&self) -> Option<u32> {
        match self {
            ResilienceError::RetriesExhausted { attempts, .. }
            | ResilienceError::NotRetryable { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// The underlying operation failure, if there is one
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            ResilienceError::RetriesExhausted { source, .. }
            | ResilienceError::NotRetryable { source, .. }
            | ResilienceError::Aborted { source, .. }
            | ResilienceError::Operation(source) => Some(source),
            _ => None,
        }
    }

    /// Convert into a [`Failure`] so the error can be classified again
    pub fn to_failure(&self) -> Failure {
        match self {
            ResilienceError::Timeout { .. } => Failure::timeout(self.to_string()),
            ResilienceError::CircuitOpen { .. } => Failure::new("CircuitOpenError", self.to_string()),
            other => other
                .failure()
                .cloned()
                .unwrap_or_else(|| Failure::error(other.to_string())),
        }
    }
}
