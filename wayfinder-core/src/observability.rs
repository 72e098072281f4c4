//! Logging setup and metric export
//!
//! [`init_tracing`] installs a `tracing-subscriber` formatter. With the
//! `observability` feature, [`PrometheusExporter`] mirrors error, recovery
//! and breaker counters into a `prometheus` registry; attach it to a
//! [`MetricsCollector`](crate::history::MetricsCollector) with
//! `with_exporter`.

use tracing_subscriber::EnvFilter;

use crate::error::{ResilienceError, ResilienceResult};

/// Install a global `fmt` subscriber.
///
/// `filter` takes `RUST_LOG` syntax; when absent, `RUST_LOG` is used, then
/// `info`. A subscriber that is already installed is left in place.
pub fn init_tracing(filter: Option<&str>) -> ResilienceResult<()> {
    let filter = match filter {
        Some(directives) => EnvFilter::try_new(directives).map_err(|e| {
            ResilienceError::configuration("tracing", format!("invalid filter '{}': {}", directives, e))
        })?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    // Err only means a global subscriber already exists
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    Ok(())
}

#[cfg(feature = "observability")]
pub use exporter::PrometheusExporter;

#[cfg(feature = "observability")]
mod exporter {
    use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

    use crate::circuit_breaker::CircuitBreakerState;
    use crate::error::{ResilienceError, ResilienceResult};
    use crate::history::ErrorRecord;

    /// Prometheus view of the resilience counters
    pub struct PrometheusExporter {
        registry: Registry,
        errors_total: IntCounterVec,
        recoveries_total: IntCounterVec,
        recovery_duration: HistogramVec,
        breaker_transitions_total: IntCounterVec,
    }

    impl std::fmt::Debug for PrometheusExporter {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("PrometheusExporter").finish_non_exhaustive()
        }
    }

    fn metric_error(e: prometheus::Error) -> ResilienceError {
        ResilienceError::configuration("prometheus", e.to_string())
    }

    impl PrometheusExporter {
        /// Exporter with its own registry
        pub fn new() -> ResilienceResult<Self> {
            Self::with_registry(Registry::new())
        }

        /// Register the wayfinder metrics on an existing registry
        pub fn with_registry(registry: Registry) -> ResilienceResult<Self> {
            let errors_total = IntCounterVec::new(
                Opts::new("wayfinder_errors_total", "Handled errors by type and severity"),
                &["type", "severity"],
            )
            .map_err(metric_error)?;

            let recoveries_total = IntCounterVec::new(
                Opts::new("wayfinder_recoveries_total", "Recovery attempts by outcome"),
                &["outcome"],
            )
            .map_err(metric_error)?;

            let recovery_duration = HistogramVec::new(
                HistogramOpts::new(
                    "wayfinder_recovery_duration_seconds",
                    "Time spent handling an error, by recovery strategy",
                ),
                &["strategy"],
            )
            .map_err(metric_error)?;

            let breaker_transitions_total = IntCounterVec::new(
                Opts::new(
                    "wayfinder_breaker_transitions_total",
                    "Circuit breaker transitions by key and target state",
                ),
                &["key", "state"],
            )
            .map_err(metric_error)?;

            registry
                .register(Box::new(errors_total.clone()))
                .map_err(metric_error)?;
            registry
                .register(Box::new(recoveries_total.clone()))
                .map_err(metric_error)?;
            registry
                .register(Box::new(recovery_duration.clone()))
                .map_err(metric_error)?;
            registry
                .register(Box::new(breaker_transitions_total.clone()))
                .map_err(metric_error)?;

            Ok(Self {
                registry,
                errors_total,
                recoveries_total,
                recovery_duration,
                breaker_transitions_total,
            })
        }

        pub fn registry(&self) -> &Registry {
            &self.registry
        }

        pub fn observe_record(&self, record: &ErrorRecord) {
            let classification = &record.classification;
            self.errors_total
                .with_label_values(&[classification.error_type.name(), classification.severity.name()])
                .inc();
            self.recoveries_total
                .with_label_values(&[record.recovery_outcome.name()])
                .inc();
            self.recovery_duration
                .with_label_values(&[classification.strategy.name()])
                .observe(record.duration.as_secs_f64());
        }

        pub fn observe_transition(&self, key: &str, state: CircuitBreakerState) {
            let state = match state {
                CircuitBreakerState::Closed => "closed",
                CircuitBreakerState::Open => "open",
                CircuitBreakerState::HalfOpen => "half_open",
            };
            self.breaker_transitions_total
                .with_label_values(&[key, state])
                .inc();
        }

        /// Text exposition format
        pub fn render(&self) -> ResilienceResult<String> {
            let mut buffer = Vec::new();
            TextEncoder::new()
                .encode(&self.registry.gather(), &mut buffer)
                .map_err(metric_error)?;
            String::from_utf8(buffer)
                .map_err(|e| ResilienceError::serialization("render metrics", e))
        }
    }
}
