//! Recovery orchestration
//!
//! [`RecoveryOrchestrator`] ties the classifier, the per-key breakers and
//! retry strategies, the handler registry and the history together. Both
//! entry points run the same pipeline:
//!
//! ```text
//! classify -> breaker gate -> dispatch on strategy -> update breaker -> record
//! ```
//!
//! - [`handle_error`](RecoveryOrchestrator::handle_error) is for callers that
//!   already caught a failure. It never fails; the outcome is a
//!   [`RecoveryResult`].
//! - [`execute`](RecoveryOrchestrator::execute) wraps an operation with
//!   breaker gating and retry, and returns a tagged [`ResilienceError`] when
//!   the breaker is open, retries run out or the classification aborts.

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::circuit_breaker::{CircuitBreakerConfig, StateChangeCallback};
use crate::classifier::{Classification, ErrorClassifier, ErrorType, RecoveryStrategy, Severity};
use crate::config::defaults::DEFAULT_BREAKER_KEY;
use crate::config::ResilienceConfig;
use crate::context::ErrorContext;
use crate::error::{ResilienceError, ResilienceResult};
use crate::events::{
    EventBus, Notification, NotificationLevel, Notifier, TracingEventBus, TracingNotifier,
    EVENT_DEGRADATION,
};
use crate::failure::Failure;
use crate::handlers::{HandlerRegistry, RecoveryHandler};
use crate::history::{ErrorHistory, ErrorRecord, MetricsCollector, MetricsSnapshot, RecoveryOutcome};
use crate::registry::ResilienceRegistry;
use crate::retry::{RetryCallbacks, RetryPolicy, RetryPredicate};

/// Re-executable operation handed to [`RecoveryOrchestrator::handle_error`]
pub type RetryOperation = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, Failure>> + Send + Sync>;

/// Per-call options for `handle_error`
#[derive(Clone, Default)]
pub struct HandleOptions {
    /// Operation to re-run when the strategy is RETRY
    pub retry_operation: Option<RetryOperation>,
    /// Overrides the configured retry policy
    pub policy: Option<RetryPolicy>,
}

impl std::fmt::Debug for HandleOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleOptions")
            .field("retry_operation", &self.retry_operation.as_ref().map(|_| "<closure>"))
            .field("policy", &self.policy)
            .finish()
    }
}

impl HandleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry<F, Fut>(mut self, operation: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Failure>> + Send + 'static,
    {
        self.retry_operation = Some(Arc::new(move || operation().boxed()));
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = Some(policy);
        self
    }
}

/// Per-call options for `execute`
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Overrides the configured retry policy
    pub policy: Option<RetryPolicy>,
    /// Breaker settings used if this key has no breaker yet
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    /// Context used for classification; defaults to one naming the key
    pub context: Option<ErrorContext>,
    /// Time limit for each attempt
    pub attempt_timeout: Option<Duration>,
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(config);
        self
    }

    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }
}

/// Why a recovery did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    CircuitOpen,
    RetriesExhausted,
    NotRetryable,
    NoOperation,
    NoHandler,
    Aborted,
    RecoveryError,
    /// The per-call retry policy failed validation
    InvalidPolicy,
}

/// Structured outcome of `handle_error`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryResult {
    pub success: bool,
    /// Breaker key the error was accounted to
    pub key: String,
    pub classification: Classification,
    pub outcome: RecoveryOutcome,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub circuit_breaker_open: bool,
    /// Invocations of the retry operation
    pub attempts: u32,
    /// Value produced by a retry, fallback or degrade handler
    pub value: Option<Value>,
    pub reason: Option<FailureReason>,
    /// The failure that was handled
    pub error: Failure,
    /// Failure raised while recovering, if any
    pub recovery_error: Option<Failure>,
}

struct Dispatched {
    outcome: RecoveryOutcome,
    value: Option<Value>,
    attempts: u32,
}

struct DispatchFailure {
    outcome: RecoveryOutcome,
    reason: FailureReason,
    attempts: u32,
    secondary: Option<Failure>,
}

impl DispatchFailure {
    fn new(outcome: RecoveryOutcome, reason: FailureReason) -> Self {
        Self {
            outcome,
            reason,
            attempts: 0,
            secondary: None,
        }
    }

    fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    fn with_secondary(mut self, failure: Failure) -> Self {
        self.secondary = Some(failure);
        self
    }
}

impl From<ResilienceError> for DispatchFailure {
    fn from(err: ResilienceError) -> Self {
        match err {
            ResilienceError::CircuitOpen { .. } => {
                DispatchFailure::new(RecoveryOutcome::CircuitOpen, FailureReason::CircuitOpen)
            }
            ResilienceError::RetriesExhausted { attempts, source, .. } => {
                DispatchFailure::new(RecoveryOutcome::Failed, FailureReason::RetriesExhausted)
                    .with_attempts(attempts)
                    .with_secondary(source)
            }
            ResilienceError::NotRetryable { attempts, source, .. } => {
                DispatchFailure::new(RecoveryOutcome::Failed, FailureReason::NotRetryable)
                    .with_attempts(attempts)
                    .with_secondary(source)
            }
            other => DispatchFailure::new(RecoveryOutcome::RecoveryError, FailureReason::RecoveryError)
                .with_secondary(other.to_failure()),
        }
    }
}

/// Unifying façade over classification, breakers, retry and handlers
pub struct RecoveryOrchestrator {
    config: ResilienceConfig,
    registry: ResilienceRegistry,
    handlers: HandlerRegistry,
    history: ErrorHistory,
    metrics: Arc<MetricsCollector>,
    events: Arc<dyn EventBus>,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for RecoveryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryOrchestrator")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("handlers", &self.handlers)
            .field("history", &self.history.len())
            .finish()
    }
}

impl RecoveryOrchestrator {
    /// Orchestrator with tracing-backed events and notifications
    pub fn new(config: ResilienceConfig) -> ResilienceResult<Self> {
        RecoveryOrchestratorBuilder::new().config(config).build()
    }

    pub fn builder() -> RecoveryOrchestratorBuilder {
        RecoveryOrchestratorBuilder::new()
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    pub fn registry(&self) -> &ResilienceRegistry {
        &self.registry
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn history(&self) -> &ErrorHistory {
        &self.history
    }

    /// Live counters, including breaker trips and resets
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn register_fallback_handler<F, Fut>(&self, id: impl Into<String>, handler: F)
    where
        F: Fn(Failure, ErrorContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Failure>> + Send + 'static,
    {
        self.handlers.register_fallback_handler(id, handler);
    }

    pub fn register_degrade_handler<F, Fut>(&self, id: impl Into<String>, handler: F)
    where
        F: Fn(Failure, ErrorContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Failure>> + Send + 'static,
    {
        self.handlers.register_degrade_handler(id, handler);
    }

    /// Classify a failure and run the recommended recovery. Never fails.
    pub async fn handle_error(
        &self,
        failure: Failure,
        context: ErrorContext,
        options: HandleOptions,
    ) -> RecoveryResult {
        let start = Instant::now();
        let mut context = context;
        context.validate(&self.config.context);

        let classification = self.registry.classifier().classify(&failure, &context);
        let key = context
            .operation_key()
            .unwrap_or(DEFAULT_BREAKER_KEY)
            .to_string();

        if self.config.enable_logging {
            debug!(
                "Handling {} error for '{}' with strategy {}: {}",
                classification.error_type, key, classification.strategy, failure
            );
        }

        let invalid_policy = options.policy.as_ref().and_then(|p| p.validate().err());

        let outcome = if let Some(err) = invalid_policy {
            Err(
                DispatchFailure::new(RecoveryOutcome::RecoveryError, FailureReason::InvalidPolicy)
                    .with_secondary(err.to_failure()),
            )
        } else if classification.strategy == RecoveryStrategy::Ignore {
            // Gate without touching breaker state
            match self.registry.existing_breaker(&key) {
                Some(breaker) if breaker.is_rejecting() => Err(DispatchFailure::from(breaker.rejection())),
                _ => Ok(Dispatched {
                    outcome: RecoveryOutcome::Ignored,
                    value: None,
                    attempts: 0,
                }),
            }
        } else {
            let breaker = self.registry.breaker(&key);
            breaker
                .guard(self.dispatch(&key, &failure, &context, &classification, &options))
                .await
        };

        let result = match outcome {
            Ok(done) => RecoveryResult {
                success: true,
                key,
                classification,
                outcome: done.outcome,
                duration: start.elapsed(),
                circuit_breaker_open: false,
                attempts: done.attempts,
                value: done.value,
                reason: None,
                error: failure,
                recovery_error: None,
            },
            Err(failed) => RecoveryResult {
                success: false,
                key,
                classification,
                outcome: failed.outcome,
                duration: start.elapsed(),
                circuit_breaker_open: failed.reason == FailureReason::CircuitOpen,
                attempts: failed.attempts,
                value: None,
                reason: Some(failed.reason),
                error: failure,
                recovery_error: failed.secondary,
            },
        };

        self.log_result(&result);
        self.notify_outcome(&result, &context).await;
        let record = ErrorRecord::new(
            &result.error,
            result.classification.clone(),
            context.to_json(),
            context.component.clone(),
            result.outcome,
        )
        .with_retries(result.attempts)
        .with_duration(result.duration);
        self.record(record);
        result
    }

    async fn dispatch(
        &self,
        key: &str,
        failure: &Failure,
        context: &ErrorContext,
        classification: &Classification,
        options: &HandleOptions,
    ) -> Result<Dispatched, DispatchFailure> {
        match classification.strategy {
            RecoveryStrategy::Retry => self.dispatch_retry(key, context, classification, options).await,
            RecoveryStrategy::Fallback => {
                let handler = self.handlers.fallback_for(&handler_ids(key, context));
                match handler {
                    Some(handler) => {
                        let value = run_handler(handler, failure, context).await.map_err(|e| {
                            DispatchFailure::new(RecoveryOutcome::RecoveryError, FailureReason::RecoveryError)
                                .with_secondary(e)
                        })?;
                        Ok(Dispatched {
                            outcome: RecoveryOutcome::Fallback,
                            value: Some(value),
                            attempts: 0,
                        })
                    }
                    None => Err(DispatchFailure::new(RecoveryOutcome::Failed, FailureReason::NoHandler)),
                }
            }
            RecoveryStrategy::Degrade => {
                self.events.emit(
                    EVENT_DEGRADATION,
                    json!({
                        "component": context.component,
                        "operation": context.operation,
                        "error": failure.message,
                    }),
                );
                let value = match self.handlers.degrade_for(&handler_ids(key, context)) {
                    Some(handler) => run_handler(handler, failure, context).await.map_err(|e| {
                        DispatchFailure::new(RecoveryOutcome::RecoveryError, FailureReason::RecoveryError)
                            .with_secondary(e)
                    })?,
                    None => json!({ "degraded": true }),
                };
                Ok(Dispatched {
                    outcome: RecoveryOutcome::Degraded,
                    value: Some(value),
                    attempts: 0,
                })
            }
            RecoveryStrategy::Abort => {
                Err(DispatchFailure::new(RecoveryOutcome::Aborted, FailureReason::Aborted))
            }
            RecoveryStrategy::Ignore => Ok(Dispatched {
                outcome: RecoveryOutcome::Ignored,
                value: None,
                attempts: 0,
            }),
        }
    }

    async fn dispatch_retry(
        &self,
        key: &str,
        context: &ErrorContext,
        classification: &Classification,
        options: &HandleOptions,
    ) -> Result<Dispatched, DispatchFailure> {
        let Some(operation) = options.retry_operation.clone() else {
            return Err(DispatchFailure::new(RecoveryOutcome::Failed, FailureReason::NoOperation));
        };

        let mut policy = options.policy.clone().unwrap_or_else(|| self.config.retry.clone());
        if classification.error_type == ErrorType::Unknown {
            policy.max_retries = policy.max_retries.min(1);
        }
        if policy.max_retries == 0 {
            return Err(exhausted(classification, FailureReason::RetriesExhausted));
        }

        let strategy = self.registry.retry_strategy(key);
        let classifier = self.registry.classifier();
        let invocations = AtomicU32::new(0);

        // The caller already spent attempt 1
        let result = strategy
            .execute_from(
                &policy,
                2,
                || {
                    invocations.fetch_add(1, Ordering::Relaxed);
                    operation()
                },
                |failure, attempt| {
                    let c = classifier.classify(failure, context);
                    c.strategy != RecoveryStrategy::Abort
                        && strategy.should_retry(failure, attempt, &policy, context)
                },
            )
            .await;

        match result {
            Ok(value) => Ok(Dispatched {
                outcome: RecoveryOutcome::Recovered,
                value: Some(value),
                attempts: invocations.load(Ordering::Relaxed),
            }),
            Err(err) => {
                let final_classification = err
                    .failure()
                    .map(|failure| classifier.classify(failure, context));
                let mut failed = DispatchFailure::from(err);
                if let Some(final_classification) = final_classification {
                    if aborts(&final_classification) {
                        failed.outcome = RecoveryOutcome::Aborted;
                        failed.reason = FailureReason::Aborted;
                    }
                }
                failed.attempts = invocations.load(Ordering::Relaxed);
                Err(failed)
            }
        }
    }

    /// Run `operation` behind the breaker for `key`, retrying per policy.
    ///
    /// One call counts as one breaker success or failure no matter how many
    /// attempts it takes. Fails with [`ResilienceError::CircuitOpen`] without
    /// invoking the operation while the breaker is open, and with
    /// [`ResilienceError::Aborted`] when the final failure classifies as ABORT
    /// or stays UNKNOWN after its single retry.
    pub async fn execute<F, Fut, T>(
        &self,
        key: &str,
        operation: F,
        options: ExecuteOptions,
    ) -> ResilienceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Failure>>,
    {
        let start = Instant::now();
        let mut context = options
            .context
            .clone()
            .unwrap_or_else(|| ErrorContext::new().with_operation(key));
        if context.operation.is_none() {
            context.operation = Some(key.to_string());
        }
        context.validate(&self.config.context);

        let policy = match &options.policy {
            Some(policy) => {
                policy.validate()?;
                policy.clone()
            }
            None => self.config.retry.clone(),
        };
        if let Some(breaker_config) = &options.circuit_breaker {
            breaker_config.validate()?;
        }
        let breaker = self.registry.breaker_with(key, options.circuit_breaker.as_ref());
        let strategy = self.registry.retry_strategy(key);
        let classifier = self.registry.classifier();
        let attempt_timeout = options.attempt_timeout;

        let invocations = AtomicU32::new(0);
        let last: Mutex<Option<(Failure, Classification)>> = Mutex::new(None);
        let mut operation = operation;

        let attempt = || {
            invocations.fetch_add(1, Ordering::Relaxed);
            let fut = operation();
            async move {
                match attempt_timeout {
                    Some(limit) => tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
                        Err(Failure::timeout(format!("attempt timed out after {:?}", limit)))
                    }),
                    None => fut.await,
                }
            }
        };
        let should_retry = |failure: &Failure, n: u32| {
            let classification = classifier.classify(failure, &context);
            let retry = match classification.strategy {
                RecoveryStrategy::Abort => false,
                _ if classification.error_type == ErrorType::Unknown => n < 2,
                _ => strategy.should_retry(failure, n, &policy, &context),
            };
            *last.lock() = Some((failure.clone(), classification));
            retry
        };

        let result = breaker
            .guard(strategy.execute_with(&policy, attempt, should_retry))
            .await;
        let attempts = invocations.load(Ordering::Relaxed);

        match result {
            Ok(value) => {
                if attempts > 1 {
                    if let Some((failure, classification)) = last.lock().take() {
                        self.record(
                            ErrorRecord::new(
                                &failure,
                                classification,
                                context.to_json(),
                                context.component.clone(),
                                RecoveryOutcome::Recovered,
                            )
                            .with_retries(attempts - 1)
                            .with_duration(start.elapsed()),
                        );
                    }
                }
                Ok(value)
            }
            Err(err) => {
                let failure = err.failure().cloned().unwrap_or_else(|| err.to_failure());
                let classification = classifier.classify(&failure, &context);

                let (err, outcome) = match err {
                    ResilienceError::NotRetryable { key, source, .. }
                    | ResilienceError::RetriesExhausted { key, source, .. }
                        if aborts(&classification) =>
                    {
                        let error_type = classification.error_type;
                        (
                            ResilienceError::Aborted {
                                key,
                                error_type,
                                source,
                            },
                            RecoveryOutcome::Aborted,
                        )
                    }
                    err @ ResilienceError::CircuitOpen { .. } => (err, RecoveryOutcome::CircuitOpen),
                    err => (err, RecoveryOutcome::Failed),
                };

                if self.config.enable_logging {
                    match outcome {
                        RecoveryOutcome::CircuitOpen => debug!("{}", err),
                        _ => warn!("{}", err),
                    }
                }
                if outcome == RecoveryOutcome::Aborted || classification.severity == Severity::Critical {
                    self.notifier.notify(
                        Notification::new(
                            NotificationLevel::Error,
                            "Feature unavailable",
                            format!("'{}' failed: {}", key, failure.message),
                        )
                        .with_component(context.component.clone().unwrap_or_else(|| key.to_string())),
                    )
                    .await;
                }

                self.record(
                    ErrorRecord::new(
                        &failure,
                        classification,
                        context.to_json(),
                        context.component.clone(),
                        outcome,
                    )
                    .with_retries(attempts.saturating_sub(1))
                    .with_duration(start.elapsed()),
                );
                Err(err)
            }
        }
    }

    fn record(&self, record: ErrorRecord) {
        if self.config.enable_metrics {
            self.metrics.record(&record);
        }
        self.history.push(record);
    }

    fn log_result(&self, result: &RecoveryResult) {
        if !self.config.enable_logging {
            return;
        }
        match (result.success, result.outcome) {
            (true, RecoveryOutcome::Ignored) => {
                debug!("Ignoring error for '{}': {}", result.key, result.error)
            }
            (true, outcome) => info!(
                "Recovered from {} error for '{}' via {} in {:?}",
                result.classification.error_type, result.key, outcome, result.duration
            ),
            (false, RecoveryOutcome::CircuitOpen) => {
                debug!("Circuit breaker '{}' is open, skipping recovery", result.key)
            }
            (false, RecoveryOutcome::Aborted) => error!(
                "Aborting '{}' on {} error: {}",
                result.key, result.classification.error_type, result.error
            ),
            (false, outcome) => warn!(
                "Recovery for '{}' failed ({}): {}",
                result.key, outcome, result.error
            ),
        }
    }

    async fn notify_outcome(&self, result: &RecoveryResult, context: &ErrorContext) {
        let component = context
            .component
            .clone()
            .unwrap_or_else(|| result.key.clone());
        let notification = match result.outcome {
            RecoveryOutcome::Degraded => Notification::new(
                NotificationLevel::Warning,
                "Running with reduced functionality",
                format!("{} is temporarily limited: {}", component, result.error.message),
            ),
            RecoveryOutcome::Aborted => Notification::new(
                NotificationLevel::Error,
                "Feature unavailable",
                format!("{} stopped: {}", component, result.error.message),
            ),
            _ if !result.success && result.classification.severity == Severity::Critical => {
                Notification::new(
                    NotificationLevel::Error,
                    "Feature unavailable",
                    format!("{} could not recover: {}", component, result.error.message),
                )
            }
            _ => return,
        };
        self.notifier.notify(notification.with_component(component)).await;
    }
}

/// ABORT-class failures, and UNKNOWN failures once their single retry is spent
fn aborts(classification: &Classification) -> bool {
    classification.strategy == RecoveryStrategy::Abort
        || classification.error_type == ErrorType::Unknown
}

fn exhausted(classification: &Classification, reason: FailureReason) -> DispatchFailure {
    if aborts(classification) {
        DispatchFailure::new(RecoveryOutcome::Aborted, FailureReason::Aborted)
    } else {
        DispatchFailure::new(RecoveryOutcome::Failed, reason)
    }
}

fn handler_ids<'a>(key: &'a str, context: &'a ErrorContext) -> Vec<&'a str> {
    let mut ids = vec![key];
    if let Some(component) = context.component.as_deref() {
        if component != key {
            ids.push(component);
        }
    }
    ids
}

/// Run a handler, turning errors and panics into a secondary failure
async fn run_handler(
    handler: RecoveryHandler,
    failure: &Failure,
    context: &ErrorContext,
) -> Result<Value, Failure> {
    let future = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        handler(failure.clone(), context.clone())
    }))
    .map_err(|_| Failure::new("RecoveryError", "recovery handler panicked"))?;

    match std::panic::AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(Failure::new("RecoveryError", "recovery handler panicked")),
    }
}

/// Builder for [`RecoveryOrchestrator`]
pub struct RecoveryOrchestratorBuilder {
    config: ResilienceConfig,
    events: Arc<dyn EventBus>,
    notifier: Arc<dyn Notifier>,
    classifier: ErrorClassifier,
    retry_callbacks: RetryCallbacks,
    custom_condition: Option<RetryPredicate>,
    state_listener: Option<StateChangeCallback>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Default for RecoveryOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RecoveryOrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: ResilienceConfig::default(),
            events: Arc::new(TracingEventBus),
            notifier: Arc::new(TracingNotifier),
            classifier: ErrorClassifier::new(),
            retry_callbacks: RetryCallbacks::default(),
            custom_condition: None,
            state_listener: None,
            metrics: None,
        }
    }

    pub fn config(mut self, config: ResilienceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn event_bus(mut self, events: Arc<dyn EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn retry_callbacks(mut self, callbacks: RetryCallbacks) -> Self {
        self.retry_callbacks = callbacks;
        self
    }

    pub fn custom_retry_condition(mut self, predicate: RetryPredicate) -> Self {
        self.custom_condition = Some(predicate);
        self
    }

    pub fn on_state_change(mut self, listener: StateChangeCallback) -> Self {
        self.state_listener = Some(listener);
        self
    }

    /// Share a collector, e.g. one wired to a Prometheus exporter
    pub fn metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> ResilienceResult<RecoveryOrchestrator> {
        self.config.validate()?;

        let metrics = self.metrics.unwrap_or_else(|| Arc::new(MetricsCollector::new()));
        let mut registry =
            ResilienceRegistry::new(self.config.circuit_breaker.clone(), self.config.retry.clone())
                .with_logging(self.config.enable_logging)
                .with_classifier(self.classifier)
                .with_retry_callbacks(self.retry_callbacks)
                .with_event_bus(self.events.clone())
                .with_metrics(metrics.clone());
        if let Some(predicate) = self.custom_condition {
            registry = registry.with_custom_condition(predicate);
        }
        if let Some(listener) = self.state_listener {
            registry = registry.with_state_listener(listener);
        }

        Ok(RecoveryOrchestrator {
            history: ErrorHistory::new(self.config.history_capacity),
            config: self.config,
            registry,
            handlers: HandlerRegistry::new(),
            metrics,
            events: self.events,
            notifier: self.notifier,
        })
    }
}
