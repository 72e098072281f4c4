//! Error classification
//!
//! Maps a [`Failure`] and its [`ErrorContext`] to a [`Classification`]:
//! an error type, a severity, a recommended recovery strategy and a
//! retryable flag. Classification is pure and deterministic. Rules are
//! scanned in a fixed order and the first match wins:
//!
//! ```text
//!  custom rules (caller supplied, insertion order)
//!  ignorable   resizeobserver loop, non-error promise rejection, cancelled  UNKNOWN/LOW/IGNORE
//!  timeout     timeout, timed out                                  TIMEOUT/MEDIUM/RETRY
//!  network     network, fetch, connection, cors, dns, refused,     NETWORK/MEDIUM/RETRY
//!              aborted
//!  validation  invalid, schema, required, malformed                VALIDATION/HIGH/FALLBACK
//!  permission  unauthorized, forbidden, access denied, permission  PERMISSION/CRITICAL/DEGRADE|ABORT
//!  data        parse, json, corrupt                                DATA/MEDIUM/FALLBACK
//!  runtime     referenceerror, typeerror, syntaxerror,             RUNTIME/CRITICAL/ABORT
//!              out of memory, allocation failed
//!  config      configuration, config, not configured,              CONFIGURATION/HIGH/ABORT
//!              missing setting
//!  context     operation/source hints a network call               NETWORK/MEDIUM/RETRY
//!  fallback                                                        UNKNOWN/MEDIUM/RETRY
//! ```
//!
//! Timeout indicators are checked before network indicators so that
//! "Request timeout after 5000ms" is a TIMEOUT rather than a NETWORK error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::context::{ContextPriority, ErrorContext};
use crate::failure::Failure;

/// Error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    Network,
    Data,
    Validation,
    Runtime,
    Timeout,
    Permission,
    Configuration,
    Unknown,
}

impl ErrorType {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorType::Network => "NETWORK",
            ErrorType::Data => "DATA",
            ErrorType::Validation => "VALIDATION",
            ErrorType::Runtime => "RUNTIME",
            ErrorType::Timeout => "TIMEOUT",
            ErrorType::Permission => "PERMISSION",
            ErrorType::Configuration => "CONFIGURATION",
            ErrorType::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How bad an error is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn name(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Recovery strategy recommended for a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryStrategy {
    Retry,
    Fallback,
    Degrade,
    Abort,
    Ignore,
}

impl RecoveryStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            RecoveryStrategy::Retry => "RETRY",
            RecoveryStrategy::Fallback => "FALLBACK",
            RecoveryStrategy::Degrade => "DEGRADE",
            RecoveryStrategy::Abort => "ABORT",
            RecoveryStrategy::Ignore => "IGNORE",
        }
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of classifying one failure. Created fresh per failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub error_type: ErrorType,
    pub severity: Severity,
    pub strategy: RecoveryStrategy,
    pub retryable: bool,
    pub timestamp: DateTime<Utc>,
}

impl Classification {
    fn new(
        error_type: ErrorType,
        severity: Severity,
        strategy: RecoveryStrategy,
        retryable: bool,
    ) -> Self {
        Self {
            error_type,
            severity,
            strategy,
            retryable,
            timestamp: Utc::now(),
        }
    }

    /// Compare everything except the timestamp
    pub fn same_outcome(&self, other: &Classification) -> bool {
        self.error_type == other.error_type
            && self.severity == other.severity
            && self.strategy == other.strategy
            && self.retryable == other.retryable
    }
}

/// A substring rule mapping matching failures to a fixed outcome
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationRule {
    pub indicators: Vec<String>,
    pub error_type: ErrorType,
    pub severity: Severity,
    pub strategy: RecoveryStrategy,
    pub retryable: bool,
}

impl ClassificationRule {
    pub fn new(
        indicators: &[&str],
        error_type: ErrorType,
        severity: Severity,
        strategy: RecoveryStrategy,
        retryable: bool,
    ) -> Self {
        Self {
            indicators: indicators.iter().map(|s| s.to_lowercase()).collect(),
            error_type,
            severity,
            strategy,
            retryable,
        }
    }

    fn matches(&self, haystack: &str) -> bool {
        self.indicators.iter().any(|needle| haystack.contains(needle.as_str()))
    }
}

const IGNORABLE_INDICATORS: &[&str] = &["resizeobserver loop", "non-error promise rejection", "cancelled"];
const TIMEOUT_INDICATORS: &[&str] = &["timeout", "timed out"];
const NETWORK_INDICATORS: &[&str] = &[
    "network", "fetch", "connection", "timeout", "cors", "dns", "refused", "aborted",
];
const VALIDATION_INDICATORS: &[&str] = &["invalid", "schema", "required", "malformed"];
const PERMISSION_INDICATORS: &[&str] = &["unauthorized", "forbidden", "access denied", "permission"];
const DATA_INDICATORS: &[&str] = &["parse", "json", "corrupt"];
const RUNTIME_INDICATORS: &[&str] = &[
    "referenceerror", "typeerror", "syntaxerror", "out of memory", "allocation failed",
];
const CONFIGURATION_INDICATORS: &[&str] = &["configuration", "config", "not configured", "missing setting"];
const NETWORK_CONTEXT_HINTS: &[&str] = &["fetch", "network", "request", "http"];

/// Deterministic failure classifier
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    custom_rules: Vec<ClassificationRule>,
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule evaluated before the built-in table
    pub fn with_rule(mut self, rule: ClassificationRule) -> Self {
        self.custom_rules.push(rule);
        self
    }

    pub fn add_rule(&mut self, rule: ClassificationRule) {
        self.custom_rules.push(rule);
    }

    /// Classify a failure in its context
    pub fn classify(&self, failure: &Failure, context: &ErrorContext) -> Classification {
        let haystack = failure.haystack();

        if let Some(rule) = self.custom_rules.iter().find(|r| r.matches(&haystack)) {
            return Classification::new(rule.error_type, rule.severity, rule.strategy, rule.retryable);
        }

        if contains_any(&haystack, IGNORABLE_INDICATORS) {
            return Classification::new(ErrorType::Unknown, Severity::Low, RecoveryStrategy::Ignore, false);
        }
        if contains_any(&haystack, TIMEOUT_INDICATORS) {
            return Classification::new(ErrorType::Timeout, Severity::Medium, RecoveryStrategy::Retry, true);
        }
        if contains_any(&haystack, NETWORK_INDICATORS) {
            return Classification::new(ErrorType::Network, Severity::Medium, RecoveryStrategy::Retry, true);
        }
        if contains_any(&haystack, VALIDATION_INDICATORS) {
            return Classification::new(
                ErrorType::Validation,
                Severity::High,
                RecoveryStrategy::Fallback,
                false,
            );
        }
        if contains_any(&haystack, PERMISSION_INDICATORS) {
            let strategy = if context.priority == ContextPriority::Critical {
                RecoveryStrategy::Abort
            } else {
                RecoveryStrategy::Degrade
            };
            return Classification::new(ErrorType::Permission, Severity::Critical, strategy, false);
        }
        if contains_any(&haystack, DATA_INDICATORS) {
            return Classification::new(ErrorType::Data, Severity::Medium, RecoveryStrategy::Fallback, true);
        }
        if contains_any(&haystack, RUNTIME_INDICATORS) {
            return Classification::new(ErrorType::Runtime, Severity::Critical, RecoveryStrategy::Abort, false);
        }
        if contains_any(&haystack, CONFIGURATION_INDICATORS) {
            return Classification::new(
                ErrorType::Configuration,
                Severity::High,
                RecoveryStrategy::Abort,
                false,
            );
        }

        let hints = [context.operation.as_deref(), context.source.as_deref()]
            .into_iter()
            .flatten()
            .map(str::to_lowercase)
            .collect::<Vec<_>>();
        if hints.iter().any(|hint| contains_any(hint, NETWORK_CONTEXT_HINTS)) {
            return Classification::new(ErrorType::Network, Severity::Medium, RecoveryStrategy::Retry, true);
        }

        Classification::new(ErrorType::Unknown, Severity::Medium, RecoveryStrategy::Retry, true)
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
