//! Error history and derived metrics
//!
//! [`ErrorHistory`] is a fixed-capacity ring buffer of [`ErrorRecord`]s;
//! pushing past capacity evicts the oldest record. [`MetricsSnapshot`] is
//! derived data: everything except the breaker trip/reset counters can be
//! recomputed from the history with [`MetricsSnapshot::from_records`].

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::circuit_breaker::CircuitBreakerState;
use crate::classifier::{Classification, ErrorType, Severity};
use crate::config::defaults::DEFAULT_HISTORY_CAPACITY;
use crate::failure::Failure;

#[cfg(feature = "observability")]
use crate::observability::PrometheusExporter;
#[cfg(feature = "observability")]
use std::sync::Arc;

/// How a recovery attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// The operation eventually succeeded on retry
    Recovered,
    /// A fallback handler produced a value
    Fallback,
    /// Continued in degraded mode
    Degraded,
    /// Classified as ignorable
    Ignored,
    /// Classified ABORT
    Aborted,
    /// Retries exhausted, no handler, or no operation to retry
    Failed,
    /// Refused by an open circuit breaker
    CircuitOpen,
    /// The recovery strategy itself failed
    RecoveryError,
}

impl RecoveryOutcome {
    pub fn name(&self) -> &'static str {
        match self {
            RecoveryOutcome::Recovered => "recovered",
            RecoveryOutcome::Fallback => "fallback",
            RecoveryOutcome::Degraded => "degraded",
            RecoveryOutcome::Ignored => "ignored",
            RecoveryOutcome::Aborted => "aborted",
            RecoveryOutcome::Failed => "failed",
            RecoveryOutcome::CircuitOpen => "circuit_open",
            RecoveryOutcome::RecoveryError => "recovery_error",
        }
    }

    /// Whether the caller may carry on
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            RecoveryOutcome::Recovered
                | RecoveryOutcome::Fallback
                | RecoveryOutcome::Degraded
                | RecoveryOutcome::Ignored
        )
    }
}

impl std::fmt::Display for RecoveryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One handled error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub error_name: String,
    pub error_message: String,
    pub classification: Classification,
    /// Sanitized context at the time of the error
    pub context: Value,
    pub component: Option<String>,
    pub recovery_outcome: RecoveryOutcome,
    /// Retries spent on this error
    pub retries: u32,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl ErrorRecord {
    pub fn new(
        failure: &Failure,
        classification: Classification,
        context: Value,
        component: Option<String>,
        recovery_outcome: RecoveryOutcome,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            error_name: failure.name.clone(),
            error_message: failure.message.clone(),
            classification,
            context,
            component,
            recovery_outcome,
            retries: 0,
            duration: Duration::ZERO,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Bounded FIFO of recent error records
#[derive(Debug)]
pub struct ErrorHistory {
    capacity: usize,
    records: Mutex<VecDeque<ErrorRecord>>,
}

impl Default for ErrorHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl ErrorHistory {
    /// A zero capacity is treated as one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a record, evicting the oldest when full
    pub fn push(&self, record: ErrorRecord) {
        let mut records = self.records.lock();
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }

    /// All records, oldest first
    pub fn records(&self) -> Vec<ErrorRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// Up to `limit` most recent records, newest first
    pub fn recent(&self, limit: usize) -> Vec<ErrorRecord> {
        self.records.lock().iter().rev().take(limit).cloned().collect()
    }

    /// Records for one component, oldest first
    pub fn for_component(&self, component: &str) -> Vec<ErrorRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.component.as_deref() == Some(component))
            .cloned()
            .collect()
    }
}

/// Aggregate counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_errors: u64,
    pub successful_recoveries: u64,
    pub failed_recoveries: u64,
    pub retried: u64,
    pub by_type: BTreeMap<ErrorType, u64>,
    pub by_severity: BTreeMap<Severity, u64>,
    pub by_component: BTreeMap<String, u64>,
    pub by_outcome: BTreeMap<RecoveryOutcome, u64>,
    pub breaker_trips: u64,
    pub breaker_resets: u64,
}

impl MetricsSnapshot {
    /// Recompute the record-derived counters. Breaker counters stay zero.
    pub fn from_records(records: &[ErrorRecord]) -> Self {
        let mut snapshot = Self::default();
        for record in records {
            snapshot.absorb(record);
        }
        snapshot
    }

    fn absorb(&mut self, record: &ErrorRecord) {
        self.total_errors += 1;
        if record.recovery_outcome.is_success() {
            self.successful_recoveries += 1;
        } else {
            self.failed_recoveries += 1;
        }
        if record.retries > 0 {
            self.retried += 1;
        }
        *self.by_type.entry(record.classification.error_type).or_default() += 1;
        *self.by_severity.entry(record.classification.severity).or_default() += 1;
        *self.by_outcome.entry(record.recovery_outcome).or_default() += 1;
        if let Some(component) = &record.component {
            *self.by_component.entry(component.clone()).or_default() += 1;
        }
    }
}

/// Live counters, updated as errors are handled and breakers move
#[derive(Default)]
pub struct MetricsCollector {
    counters: Mutex<MetricsSnapshot>,
    breaker_trips: AtomicU64,
    breaker_resets: AtomicU64,
    #[cfg(feature = "observability")]
    exporter: Option<Arc<PrometheusExporter>>,
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror every update into a Prometheus registry
    #[cfg(feature = "observability")]
    pub fn with_exporter(mut self, exporter: Arc<PrometheusExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    #[cfg(feature = "observability")]
    pub fn exporter(&self) -> Option<&Arc<PrometheusExporter>> {
        self.exporter.as_ref()
    }

    pub fn record(&self, record: &ErrorRecord) {
        self.counters.lock().absorb(record);
        #[cfg(feature = "observability")]
        if let Some(exporter) = &self.exporter {
            exporter.observe_record(record);
        }
    }

    /// Count a breaker transition into `state`
    pub fn record_transition(&self, key: &str, state: CircuitBreakerState) {
        match state {
            CircuitBreakerState::Open => {
                self.breaker_trips.fetch_add(1, Ordering::Relaxed);
            }
            CircuitBreakerState::Closed => {
                self.breaker_resets.fetch_add(1, Ordering::Relaxed);
            }
            CircuitBreakerState::HalfOpen => {}
        }
        #[cfg(feature = "observability")]
        if let Some(exporter) = &self.exporter {
            exporter.observe_transition(key, state);
        }
        #[cfg(not(feature = "observability"))]
        let _ = key;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut snapshot = self.counters.lock().clone();
        snapshot.breaker_trips = self.breaker_trips.load(Ordering::Relaxed);
        snapshot.breaker_resets = self.breaker_resets.load(Ordering::Relaxed);
        snapshot
    }

    pub fn reset(&self) {
        *self.counters.lock() = MetricsSnapshot::default();
        self.breaker_trips.store(0, Ordering::Relaxed);
        self.breaker_resets.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ErrorClassifier;
    use crate::context::ErrorContext;
    use pretty_assertions::assert_eq;

    fn record(message: &str, component: &str, outcome: RecoveryOutcome) -> ErrorRecord {
        let failure = Failure::error(message);
        let classification = ErrorClassifier::new().classify(&failure, &ErrorContext::new());
        ErrorRecord::new(
            &failure,
            classification,
            Value::Null,
            Some(component.to_string()),
            outcome,
        )
    }

    #[test]
    fn test_ring_buffer_keeps_most_recent() {
        let history = ErrorHistory::new(100);
        for i in 0..101 {
            history.push(record(&format!("error {}", i), "map", RecoveryOutcome::Failed));
        }

        let records = history.records();
        assert_eq!(records.len(), 100);
        assert_eq!(records.first().map(|r| r.error_message.as_str()), Some("error 1"));
        assert_eq!(records.last().map(|r| r.error_message.as_str()), Some("error 100"));
        assert_eq!(history.recent(1)[0].error_message, "error 100");
    }

    #[test]
    fn test_clear_empties_history() {
        let history = ErrorHistory::new(3);
        history.push(record("a", "map", RecoveryOutcome::Failed));
        history.push(record("b", "map", RecoveryOutcome::Failed));
        assert_eq!(history.len(), 2);

        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn test_metrics_recomputed_from_history() {
        let records = vec![
            record("network down", "tiles", RecoveryOutcome::Recovered).with_retries(2),
            record("invalid schema", "sidebar", RecoveryOutcome::Fallback),
            record("request timeout", "tiles", RecoveryOutcome::Failed).with_retries(3),
        ];

        let snapshot = MetricsSnapshot::from_records(&records);
        assert_eq!(snapshot.total_errors, 3);
        assert_eq!(snapshot.successful_recoveries, 2);
        assert_eq!(snapshot.failed_recoveries, 1);
        assert_eq!(snapshot.retried, 2);
        assert_eq!(snapshot.by_type.get(&ErrorType::Network), Some(&1));
        assert_eq!(snapshot.by_type.get(&ErrorType::Validation), Some(&1));
        assert_eq!(snapshot.by_type.get(&ErrorType::Timeout), Some(&1));
        assert_eq!(snapshot.by_component.get("tiles"), Some(&2));
        assert_eq!(snapshot.breaker_trips, 0);
    }

    #[test]
    fn test_collector_matches_history_and_counts_transitions() {
        let collector = MetricsCollector::new();
        let history = ErrorHistory::new(10);
        for r in [
            record("network down", "tiles", RecoveryOutcome::Recovered),
            record("corrupt json", "incidents", RecoveryOutcome::Degraded),
        ] {
            collector.record(&r);
            history.push(r);
        }
        collector.record_transition("tiles", CircuitBreakerState::Open);
        collector.record_transition("tiles", CircuitBreakerState::HalfOpen);
        collector.record_transition("tiles", CircuitBreakerState::Closed);

        let live = collector.snapshot();
        let mut derived = MetricsSnapshot::from_records(&history.records());
        derived.breaker_trips = 1;
        derived.breaker_resets = 1;
        assert_eq!(live, derived);

        collector.reset();
        assert_eq!(collector.snapshot(), MetricsSnapshot::default());
    }
}
