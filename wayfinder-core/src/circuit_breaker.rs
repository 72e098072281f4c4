//! Circuit Breaker Pattern for Fault Tolerance
//!
//! The circuit breaker stops Wayfinder from repeatedly calling a dependency
//! that keeps failing (a tile server, an incident feed) until a cool-down
//! has elapsed.
//!
//! ## States
//!
//! - **Closed**: Normal operation, requests pass through
//! - **Open**: Failing fast, requests are rejected immediately
//! - **Half-Open**: A single probe request is admitted to test recovery
//!
//! ## Transitions
//!
//! ```text
//!   Closed --(failure_count >= threshold)--> Open
//!   Open --(now - last_failure > reset_timeout, on can_execute)--> HalfOpen
//!   HalfOpen --(probe succeeds)--> Closed      failure_count = 0
//!   HalfOpen --(probe fails)--> Open           last_failure = now
//!   Closed --(success)--> Closed               failure_count = 0
//! ```
//!
//! All state lives behind one mutex, so the Open -> HalfOpen transition is
//! taken by exactly one caller and at most one probe is in flight.
//!
//! Every transition bumps a generation counter. Calls run through
//! [`CircuitBreaker::guard`] carry the generation they were admitted under;
//! an outcome that arrives after the breaker has moved on is counted in the
//! stats but does not change state or touch the probe slot.
//!
//! ## Usage Example
//!
//! ```rust
//! use std::time::Duration;
//! use wayfinder_core::circuit_breaker::CircuitBreakerBuilder;
//! use wayfinder_core::failure::Failure;
//!
//! # async fn example() {
//! let breaker = CircuitBreakerBuilder::new("incident-feed")
//!     .failure_threshold(5)
//!     .reset_timeout(Duration::from_secs(30))
//!     .build();
//!
//! let result = breaker
//!     .call(|| async { Ok::<_, Failure>("features".to_string()) })
//!     .await;
//! assert!(result.is_ok());
//! # }
//! ```

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::defaults::{DEFAULT_FAILURE_THRESHOLD, DEFAULT_RESET_TIMEOUT_MS};
use crate::error::{ResilienceError, ResilienceResult};
use crate::failure::Failure;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitBreakerState {
    /// Normal operation - requests pass through
    Closed,
    /// Failing fast - requests are rejected immediately
    Open,
    /// Testing if the dependency has recovered - one probe allowed
    HalfOpen,
}

impl std::fmt::Display for CircuitBreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitBreakerState::Closed => write!(f, "closed"),
            CircuitBreakerState::Open => write!(f, "open"),
            CircuitBreakerState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Time since the last failure before an open circuit admits a probe
    #[serde(with = "humantime_serde")]
    pub reset_timeout: Duration,
    /// Enable automatic logging of state transitions
    pub enable_logging: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_timeout: Duration::from_millis(DEFAULT_RESET_TIMEOUT_MS),
            enable_logging: true,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> ResilienceResult<()> {
        if self.failure_threshold == 0 {
            return Err(ResilienceError::configuration(
                "circuit_breaker.failure_threshold",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Callback invoked on every state transition with `(key, old, new)`
pub type StateChangeCallback =
    Arc<dyn Fn(&str, CircuitBreakerState, CircuitBreakerState) + Send + Sync>;

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerSnapshot {
    pub key: String,
    pub state: CircuitBreakerState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    #[serde(with = "humantime_serde")]
    pub reset_timeout: Duration,
    /// Time elapsed since the last recorded failure
    #[serde(with = "humantime_serde")]
    pub last_failure_age: Option<Duration>,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub rejected_calls: u64,
    pub trips: u64,
    pub resets: u64,
}

/// Permission for one call, tied to the generation it was granted under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Admission {
    probe: bool,
    generation: u64,
}

/// Internal state for circuit breaker
struct CircuitBreakerInternalState {
    state: CircuitBreakerState,
    failure_count: u32,
    probe_in_flight: bool,
    last_failure_at: Option<Instant>,
    generation: u64,
}

impl CircuitBreakerInternalState {
    fn transition_to(&mut self, next: CircuitBreakerState) {
        if self.state != next {
            self.state = next;
            self.generation = self.generation.wrapping_add(1);
        }
    }

    fn is_stale(&self, admission: Option<Admission>) -> bool {
        admission.map_or(false, |a| a.generation != self.generation)
    }
}

/// Circuit breaker guarding one operation key
pub struct CircuitBreaker {
    key: String,
    config: CircuitBreakerConfig,
    internal_state: Mutex<CircuitBreakerInternalState>,
    on_state_change: Option<StateChangeCallback>,

    total_calls: AtomicU64,
    successful_calls: AtomicU64,
    failed_calls: AtomicU64,
    rejected_calls: AtomicU64,
    trips: AtomicU64,
    resets: AtomicU64,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("key", &self.key)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(key: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            key: key.into(),
            config,
            internal_state: Mutex::new(CircuitBreakerInternalState {
                state: CircuitBreakerState::Closed,
                failure_count: 0,
                probe_in_flight: false,
                last_failure_at: None,
                generation: 0,
            }),
            on_state_change: None,
            total_calls: AtomicU64::new(0),
            successful_calls: AtomicU64::new(0),
            failed_calls: AtomicU64::new(0),
            rejected_calls: AtomicU64::new(0),
            trips: AtomicU64::new(0),
            resets: AtomicU64::new(0),
        }
    }

    /// Register the transition callback
    pub fn with_state_listener(mut self, callback: StateChangeCallback) -> Self {
        self.on_state_change = Some(callback);
        self
    }

    /// Execute an operation through the circuit breaker
    ///
    /// The operation is not invoked when the breaker refuses the call.
    pub async fn call<F, Fut, T>(&self, operation: F) -> ResilienceResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Failure>>,
    {
        self.guard(async move { operation().await.map_err(ResilienceError::Operation) })
            .await
    }

    /// Run a composite operation (such as a whole retry loop) as one breaker
    /// call: one admission, then one recorded success or failure. The future
    /// is dropped unpolled when the breaker refuses the call.
    pub async fn guard<Fut, T, E>(&self, operation: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: From<ResilienceError>,
    {
        let admission = match self.admit() {
            Some(admission) => admission,
            None => return Err(self.rejection().into()),
        };

        let mut guard = ProbeGuard {
            breaker: self,
            probe: Some(admission).filter(|a| a.probe),
        };
        let result = operation.await;
        guard.probe = None;

        match &result {
            Ok(_) => self.settle_success(Some(admission)),
            Err(_) => self.settle_failure(Some(admission)),
        }
        result
    }

    /// Gate for a call. While open and past the reset timeout this moves the
    /// breaker to half-open and admits exactly one probe.
    ///
    /// A caller that gets `true` owns the call and must report it with
    /// [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure).
    pub fn can_execute(&self) -> bool {
        self.admit().is_some()
    }

    /// True when a call would be refused right now. Unlike
    /// [`can_execute`](Self::can_execute) this never changes state or takes
    /// the probe slot.
    pub fn is_rejecting(&self) -> bool {
        let state = self.internal_state.lock();
        match state.state {
            CircuitBreakerState::Closed => false,
            CircuitBreakerState::Open => state
                .last_failure_at
                .map(|at| at.elapsed() <= self.config.reset_timeout)
                .unwrap_or(false),
            CircuitBreakerState::HalfOpen => state.probe_in_flight,
        }
    }

    /// Error describing a refused call, counted as a rejection
    pub fn rejection(&self) -> ResilienceError {
        self.rejected_calls.fetch_add(1, Ordering::Relaxed);
        ResilienceError::CircuitOpen {
            key: self.key.clone(),
            state: self.state(),
        }
    }

    fn admit(&self) -> Option<Admission> {
        let mut transition = None;
        let admission = {
            let mut state = self.internal_state.lock();
            let probe = match state.state {
                CircuitBreakerState::Closed => Some(false),
                CircuitBreakerState::Open => {
                    let expired = state
                        .last_failure_at
                        .map(|at| at.elapsed() > self.config.reset_timeout)
                        .unwrap_or(true);
                    if expired {
                        state.transition_to(CircuitBreakerState::HalfOpen);
                        state.probe_in_flight = true;
                        transition = Some((CircuitBreakerState::Open, CircuitBreakerState::HalfOpen));
                        Some(true)
                    } else {
                        None
                    }
                }
                CircuitBreakerState::HalfOpen => {
                    if state.probe_in_flight {
                        None
                    } else {
                        state.probe_in_flight = true;
                        Some(true)
                    }
                }
            };
            probe.map(|probe| Admission {
                probe,
                generation: state.generation,
            })
        };

        if admission.is_some() {
            self.total_calls.fetch_add(1, Ordering::Relaxed);
        }
        if let Some((old, new)) = transition {
            if self.config.enable_logging {
                info!("Circuit breaker '{}' transitioning to half-open", self.key);
            }
            self.notify(old, new);
        }
        admission
    }

    /// Record a successful call admitted by [`can_execute`](Self::can_execute).
    /// An open breaker only closes through a half-open probe.
    pub fn record_success(&self) {
        self.settle_success(None);
    }

    /// Record a failed call admitted by [`can_execute`](Self::can_execute)
    pub fn record_failure(&self) {
        self.settle_failure(None);
    }

    fn settle_success(&self, admission: Option<Admission>) {
        self.successful_calls.fetch_add(1, Ordering::Relaxed);

        let previous = {
            let mut state = self.internal_state.lock();
            if state.is_stale(admission) || state.state == CircuitBreakerState::Open {
                None
            } else {
                let previous = state.state;
                state.failure_count = 0;
                state.probe_in_flight = false;
                state.transition_to(CircuitBreakerState::Closed);
                Some(previous)
            }
        };

        let previous = match previous {
            Some(previous) => previous,
            None => {
                if self.config.enable_logging {
                    debug!("Circuit breaker '{}' ignoring late success", self.key);
                }
                return;
            }
        };

        if previous != CircuitBreakerState::Closed {
            self.resets.fetch_add(1, Ordering::Relaxed);
            if self.config.enable_logging {
                info!("Circuit breaker '{}' closing after successful {} call", self.key, previous);
            }
            self.notify(previous, CircuitBreakerState::Closed);
        }
    }

    fn settle_failure(&self, admission: Option<Admission>) {
        self.failed_calls.fetch_add(1, Ordering::Relaxed);

        let settled = {
            let mut state = self.internal_state.lock();
            if state.is_stale(admission) {
                None
            } else {
                let previous = state.state;
                state.failure_count = state.failure_count.saturating_add(1);
                state.last_failure_at = Some(Instant::now());

                match previous {
                    CircuitBreakerState::Closed => {
                        if state.failure_count >= self.config.failure_threshold {
                            state.transition_to(CircuitBreakerState::Open);
                        }
                    }
                    CircuitBreakerState::HalfOpen => {
                        state.probe_in_flight = false;
                        state.transition_to(CircuitBreakerState::Open);
                    }
                    CircuitBreakerState::Open => {}
                }
                Some((previous, state.state, state.failure_count))
            }
        };

        let (previous, current, failures) = match settled {
            Some(settled) => settled,
            None => {
                if self.config.enable_logging {
                    debug!("Circuit breaker '{}' ignoring late failure", self.key);
                }
                return;
            }
        };

        if previous == CircuitBreakerState::Open {
            return;
        }
        if current == CircuitBreakerState::Open {
            self.trips.fetch_add(1, Ordering::Relaxed);
            if self.config.enable_logging {
                if previous == CircuitBreakerState::HalfOpen {
                    warn!("Circuit breaker '{}' reopening after failed probe", self.key);
                } else {
                    warn!(
                        "Circuit breaker '{}' opening after {} consecutive failures",
                        self.key, failures
                    );
                }
            }
            self.notify(previous, CircuitBreakerState::Open);
        } else if self.config.enable_logging {
            debug!(
                "Circuit breaker '{}' failure {}/{}",
                self.key, failures, self.config.failure_threshold
            );
        }
    }

    fn release_probe(&self, admission: Admission) {
        let mut state = self.internal_state.lock();
        if state.state == CircuitBreakerState::HalfOpen && !state.is_stale(Some(admission)) {
            state.probe_in_flight = false;
        }
    }

    fn notify(&self, old: CircuitBreakerState, new: CircuitBreakerState) {
        if let Some(callback) = &self.on_state_change {
            let key = self.key.as_str();
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(key, old, new)
            }));
            if outcome.is_err() {
                warn!("Circuit breaker '{}' state listener panicked", self.key);
            }
        }
    }

    /// Current state without side effects
    pub fn state(&self) -> CircuitBreakerState {
        self.internal_state.lock().state
    }

    /// Consecutive failures recorded since the last success
    pub fn failure_count(&self) -> u32 {
        self.internal_state.lock().failure_count
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get a point-in-time snapshot
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let state = self.internal_state.lock();
        CircuitBreakerSnapshot {
            key: self.key.clone(),
            state: state.state,
            failure_count: state.failure_count,
            failure_threshold: self.config.failure_threshold,
            reset_timeout: self.config.reset_timeout,
            last_failure_age: state.last_failure_at.map(|at| at.elapsed()),
            total_calls: self.total_calls.load(Ordering::Relaxed),
            successful_calls: self.successful_calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            rejected_calls: self.rejected_calls.load(Ordering::Relaxed),
            trips: self.trips.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
        }
    }

    /// Force the circuit breaker to open (for testing or emergency)
    pub fn force_open(&self) {
        let previous = {
            let mut state = self.internal_state.lock();
            let previous = state.state;
            state.transition_to(CircuitBreakerState::Open);
            state.probe_in_flight = false;
            state.last_failure_at = Some(Instant::now());
            previous
        };
        if self.config.enable_logging {
            warn!("Circuit breaker '{}' forcibly opened", self.key);
        }
        if previous != CircuitBreakerState::Open {
            self.trips.fetch_add(1, Ordering::Relaxed);
            self.notify(previous, CircuitBreakerState::Open);
        }
    }

    /// Force the circuit breaker to close and forget failures
    pub fn reset(&self) {
        let previous = {
            let mut state = self.internal_state.lock();
            let previous = state.state;
            state.transition_to(CircuitBreakerState::Closed);
            // Outcomes of calls admitted before the reset no longer count
            state.generation = state.generation.wrapping_add(1);
            state.failure_count = 0;
            state.probe_in_flight = false;
            state.last_failure_at = None;
            previous
        };
        if self.config.enable_logging {
            info!("Circuit breaker '{}' reset", self.key);
        }
        if previous != CircuitBreakerState::Closed {
            self.resets.fetch_add(1, Ordering::Relaxed);
            self.notify(previous, CircuitBreakerState::Closed);
        }
    }
}

/// Releases the half-open probe slot if a probe call is dropped before completing
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    probe: Option<Admission>,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if let Some(admission) = self.probe.take() {
            self.breaker.release_probe(admission);
        }
    }
}

/// Circuit breaker builder for easier configuration
pub struct CircuitBreakerBuilder {
    key: String,
    config: CircuitBreakerConfig,
    listener: Option<StateChangeCallback>,
}

impl CircuitBreakerBuilder {
    /// Create a new circuit breaker builder
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            config: CircuitBreakerConfig::default(),
            listener: None,
        }
    }

    /// Start from an existing configuration
    pub fn config(mut self, config: CircuitBreakerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the failure threshold
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Set the reset timeout
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.config.reset_timeout = timeout;
        self
    }

    /// Enable or disable logging
    pub fn enable_logging(mut self, enable: bool) -> Self {
        self.config.enable_logging = enable;
        self
    }

    /// Set the transition callback
    pub fn on_state_change(mut self, callback: StateChangeCallback) -> Self {
        self.listener = Some(callback);
        self
    }

    /// Build the circuit breaker
    pub fn build(self) -> CircuitBreaker {
        let breaker = CircuitBreaker::new(self.key, self.config);
        match self.listener {
            Some(listener) => breaker.with_state_listener(listener),
            None => breaker,
        }
    }
}
