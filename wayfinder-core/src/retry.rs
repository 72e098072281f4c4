//! Retry with exponential backoff and jitter
//!
//! A [`RetryStrategy`] runs an operation up to `max_retries + 1` times.
//! There is no delay before the first attempt; before attempt `n >= 2`:
//!
//! ```text
//! delay  = min(initial_delay * multiplier^(n-2), max_delay)
//! jitter = uniform(-jitter_factor * delay, +jitter_factor * delay)   (if enabled)
//! final  = max(delay + jitter, 0)
//! ```
//!
//! Before each retry the [`RetryCondition`] is consulted; a `false` answer
//! stops immediately with the current failure instead of spending the rest
//! of the budget. On exhaustion the last failure is surfaced with the
//! attempt count.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::classifier::{ErrorClassifier, ErrorType};
use crate::config::defaults::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS, DEFAULT_JITTER_ENABLED,
    DEFAULT_JITTER_FACTOR, DEFAULT_MAX_DELAY_MS, DEFAULT_MAX_RETRIES,
};
use crate::context::ErrorContext;
use crate::error::{ResilienceError, ResilienceResult};
use crate::failure::Failure;

/// When a failed attempt may be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryCondition {
    /// Retry every failure
    Always,
    /// Retry failures the classifier marks retryable
    OnError,
    /// Retry only timeouts
    OnTimeout,
    /// Retry network failures and timeouts
    OnNetworkError,
    /// Ask the strategy's custom predicate
    Custom,
}

impl Default for RetryCondition {
    fn default() -> Self {
        RetryCondition::OnError
    }
}

impl FromStr for RetryCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "always" => Ok(RetryCondition::Always),
            "on_error" => Ok(RetryCondition::OnError),
            "on_timeout" => Ok(RetryCondition::OnTimeout),
            "on_network_error" => Ok(RetryCondition::OnNetworkError),
            "custom" => Ok(RetryCondition::Custom),
            other => Err(format!("unknown retry condition '{}'", other)),
        }
    }
}

/// Retry configuration. Immutable once built; callers override per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the second attempt
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    /// Upper bound on the pre-jitter delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
    /// Jitter spread as a fraction of the delay, within `[0, 1]`
    pub jitter_factor: f64,
    pub retry_condition: RetryCondition,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: DEFAULT_JITTER_ENABLED,
            jitter_factor: DEFAULT_JITTER_FACTOR,
            retry_condition: RetryCondition::default(),
        }
    }
}

impl RetryPolicy {
    /// Exponential policy without jitter
    pub fn exponential(max_retries: u32, initial_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_retries,
            initial_delay,
            backoff_multiplier: multiplier,
            jitter: false,
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, enabled: bool, factor: f64) -> Self {
        self.jitter = enabled;
        self.jitter_factor = factor;
        self
    }

    pub fn with_condition(mut self, condition: RetryCondition) -> Self {
        self.retry_condition = condition;
        self
    }

    pub fn validate(&self) -> ResilienceResult<()> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ResilienceError::configuration(
                "retry.backoff_multiplier",
                format!("must be at least 1.0, got {}", self.backoff_multiplier),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ResilienceError::configuration(
                "retry.jitter_factor",
                format!("must be within [0, 1], got {}", self.jitter_factor),
            ));
        }
        if self.initial_delay > self.max_delay {
            return Err(ResilienceError::configuration(
                "retry.initial_delay",
                format!(
                    "{:?} exceeds max_delay {:?}",
                    self.initial_delay, self.max_delay
                ),
            ));
        }
        Ok(())
    }

    /// Pre-jitter delay before `attempt` (1-based). Zero for the first attempt.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(2).min(i32::MAX as u32) as i32;
        let seconds = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !seconds.is_finite() || seconds >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(seconds.max(0.0)).min(self.max_delay)
        }
    }

    /// Delay before `attempt`, jittered when enabled
    pub fn delay_for_attempt<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let delay = self.base_delay(attempt);
        if self.jitter {
            apply_jitter(delay, self.jitter_factor, rng)
        } else {
            delay
        }
    }
}

/// Spread `delay` uniformly by `±factor * delay`, never below zero
pub fn apply_jitter<R: Rng + ?Sized>(delay: Duration, factor: f64, rng: &mut R) -> Duration {
    if !factor.is_finite() || factor <= 0.0 || delay.is_zero() {
        return delay;
    }
    let base = delay.as_nanos() as f64;
    let spread = base * factor;
    let jittered = base + rng.gen_range(-spread..=spread);
    Duration::from_nanos(jittered.max(0.0).round() as u64)
}

/// Custom retry predicate: `(failure, attempt) -> retry?`
pub type RetryPredicate = Arc<dyn Fn(&Failure, u32) -> bool + Send + Sync>;

/// `(failure, retry_number, delay)`
pub type RetryCallback = Arc<dyn Fn(&Failure, u32, Duration) + Send + Sync>;
/// `(attempt, elapsed)`
pub type SuccessCallback = Arc<dyn Fn(u32, Duration) + Send + Sync>;
/// `(failure, attempt, elapsed)`
pub type FailureCallback = Arc<dyn Fn(&Failure, u32, Duration) + Send + Sync>;
/// `(failure, max_retries)`
pub type ExhaustedCallback = Arc<dyn Fn(&Failure, u32) + Send + Sync>;

/// Observer hooks. Fire-and-forget; a panicking hook is logged and ignored.
#[derive(Clone, Default)]
pub struct RetryCallbacks {
    pub on_retry: Option<RetryCallback>,
    pub on_success: Option<SuccessCallback>,
    pub on_failure: Option<FailureCallback>,
    pub on_max_retries_exceeded: Option<ExhaustedCallback>,
}

impl std::fmt::Debug for RetryCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryCallbacks")
            .field("on_retry", &self.on_retry.as_ref().map(|_| "<closure>"))
            .field("on_success", &self.on_success.as_ref().map(|_| "<closure>"))
            .field("on_failure", &self.on_failure.as_ref().map(|_| "<closure>"))
            .field(
                "on_max_retries_exceeded",
                &self.on_max_retries_exceeded.as_ref().map(|_| "<closure>"),
            )
            .finish()
    }
}

pub(crate) fn fire<F: FnOnce()>(hook: &str, f: F) {
    if std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)).is_err() {
        warn!("{} callback panicked; ignoring", hook);
    }
}

/// Counters for one strategy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryStats {
    pub executions: u64,
    pub attempts: u64,
    pub retries: u64,
    pub successes: u64,
    pub failures: u64,
    pub exhausted: u64,
}

#[derive(Default)]
struct RetryCounters {
    executions: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    exhausted: AtomicU64,
}

/// Retry executor bound to one operation key
pub struct RetryStrategy {
    key: String,
    policy: RetryPolicy,
    classifier: ErrorClassifier,
    custom_condition: Option<RetryPredicate>,
    callbacks: RetryCallbacks,
    enable_logging: bool,
    counters: RetryCounters,
}

impl std::fmt::Debug for RetryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryStrategy")
            .field("key", &self.key)
            .field("policy", &self.policy)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

impl RetryStrategy {
    pub fn new(key: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            key: key.into(),
            policy,
            classifier: ErrorClassifier::new(),
            custom_condition: None,
            callbacks: RetryCallbacks::default(),
            enable_logging: true,
            counters: RetryCounters::default(),
        }
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Predicate used by [`RetryCondition::Custom`]
    pub fn with_custom_condition(mut self, predicate: RetryPredicate) -> Self {
        self.custom_condition = Some(predicate);
        self
    }

    pub fn with_callbacks(mut self, callbacks: RetryCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn stats(&self) -> RetryStats {
        RetryStats {
            executions: self.counters.executions.load(Ordering::Relaxed),
            attempts: self.counters.attempts.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            successes: self.counters.successes.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            exhausted: self.counters.exhausted.load(Ordering::Relaxed),
        }
    }

    /// Whether the policy's condition allows retrying this failure
    pub fn should_retry(
        &self,
        failure: &Failure,
        attempt: u32,
        policy: &RetryPolicy,
        context: &ErrorContext,
    ) -> bool {
        match policy.retry_condition {
            RetryCondition::Always => true,
            RetryCondition::OnError => self.classifier.classify(failure, context).retryable,
            RetryCondition::OnTimeout => {
                self.classifier.classify(failure, context).error_type == ErrorType::Timeout
            }
            RetryCondition::OnNetworkError => matches!(
                self.classifier.classify(failure, context).error_type,
                ErrorType::Network | ErrorType::Timeout
            ),
            RetryCondition::Custom => match &self.custom_condition {
                Some(predicate) => predicate(failure, attempt),
                None => self.classifier.classify(failure, context).retryable,
            },
        }
    }

    /// Run `operation` with this strategy's own policy
    pub async fn execute<F, Fut, T>(&self, operation: F) -> ResilienceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Failure>>,
    {
        let policy = self.policy.clone();
        let context = ErrorContext::new().with_operation(self.key.clone());
        self.execute_with(&policy, operation, |failure, attempt| {
            self.should_retry(failure, attempt, &policy, &context)
        })
        .await
    }

    /// Run `operation` under an explicit policy and retry predicate
    pub async fn execute_with<F, Fut, T, P>(
        &self,
        policy: &RetryPolicy,
        operation: F,
        should_retry: P,
    ) -> ResilienceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Failure>>,
        P: Fn(&Failure, u32) -> bool,
    {
        self.execute_from(policy, 1, operation, should_retry).await
    }

    /// Like [`execute_with`](Self::execute_with), but the first invocation
    /// counts as attempt `first_attempt`, preceded by that attempt's delay.
    /// Used when the caller already spent attempt 1 itself. At least one
    /// invocation is always made.
    pub async fn execute_from<F, Fut, T, P>(
        &self,
        policy: &RetryPolicy,
        first_attempt: u32,
        mut operation: F,
        should_retry: P,
    ) -> ResilienceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Failure>>,
        P: Fn(&Failure, u32) -> bool,
    {
        self.counters.executions.fetch_add(1, Ordering::Relaxed);
        let max_attempts = policy.max_retries.saturating_add(1);
        let start = Instant::now();
        let mut attempt = first_attempt.max(1);

        if attempt > 1 {
            let delay = policy.delay_for_attempt(attempt, &mut rand::thread_rng());
            self.counters.retries.fetch_add(1, Ordering::Relaxed);
            sleep(delay).await;
        }

        loop {
            self.counters.attempts.fetch_add(1, Ordering::Relaxed);

            match operation().await {
                Ok(value) => {
                    self.counters.successes.fetch_add(1, Ordering::Relaxed);
                    if attempt > 1 && self.enable_logging {
                        debug!("{} succeeded after {} attempts", self.key, attempt);
                    }
                    if let Some(hook) = &self.callbacks.on_success {
                        fire("on_success", || hook(attempt, start.elapsed()));
                    }
                    return Ok(value);
                }
                Err(failure) => {
                    self.counters.failures.fetch_add(1, Ordering::Relaxed);
                    if let Some(hook) = &self.callbacks.on_failure {
                        fire("on_failure", || hook(&failure, attempt, start.elapsed()));
                    }

                    if attempt >= max_attempts {
                        self.counters.exhausted.fetch_add(1, Ordering::Relaxed);
                        if self.enable_logging {
                            warn!(
                                "Max retries ({}) reached for {}: {}",
                                policy.max_retries, self.key, failure
                            );
                        }
                        if let Some(hook) = &self.callbacks.on_max_retries_exceeded {
                            fire("on_max_retries_exceeded", || hook(&failure, policy.max_retries));
                        }
                        return Err(ResilienceError::RetriesExhausted {
                            key: self.key.clone(),
                            attempts: attempt,
                            source: failure,
                        });
                    }

                    if !should_retry(&failure, attempt) {
                        if self.enable_logging {
                            debug!("Error is not retryable for {}: {}", self.key, failure);
                        }
                        return Err(ResilienceError::NotRetryable {
                            key: self.key.clone(),
                            attempts: attempt,
                            source: failure,
                        });
                    }

                    let delay = policy.delay_for_attempt(attempt + 1, &mut rand::thread_rng());
                    self.counters.retries.fetch_add(1, Ordering::Relaxed);

                    if self.enable_logging {
                        warn!(
                            "Retry attempt {}/{} for {} after error: {} (waiting {:?})",
                            attempt, policy.max_retries, self.key, failure, delay
                        );
                    }
                    if let Some(hook) = &self.callbacks.on_retry {
                        fire("on_retry", || hook(&failure, attempt, delay));
                    }

                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::AtomicU32;

    fn quiet(policy: RetryPolicy) -> RetryStrategy {
        RetryStrategy::new("test", policy).with_logging(false)
    }

    #[test]
    fn test_backoff_sequence() {
        let policy = RetryPolicy::exponential(5, Duration::from_millis(100), 2.0)
            .with_max_delay(Duration::from_millis(500));

        assert_eq!(policy.base_delay(1), Duration::ZERO);
        assert_eq!(policy.base_delay(2), Duration::from_millis(100));
        assert_eq!(policy.base_delay(3), Duration::from_millis(200));
        assert_eq!(policy.base_delay(4), Duration::from_millis(400));
        assert_eq!(policy.base_delay(5), Duration::from_millis(500));
        assert_eq!(policy.base_delay(60), Duration::from_millis(500));
    }

    #[test]
    fn test_non_finite_jitter_is_rejected_and_ignored() {
        let policy = RetryPolicy::exponential(2, Duration::from_millis(100), 2.0)
            .with_jitter(true, f64::NAN);
        assert!(policy.validate().is_err());
        assert!(RetryPolicy::default().with_jitter(true, f64::INFINITY).validate().is_err());

        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(policy.delay_for_attempt(2, &mut rng), Duration::from_millis(100));
    }

    #[test]
    fn test_retry_condition_parsing() {
        assert_eq!("on-timeout".parse::<RetryCondition>(), Ok(RetryCondition::OnTimeout));
        assert_eq!("ALWAYS".parse::<RetryCondition>(), Ok(RetryCondition::Always));
        assert!("sometimes".parse::<RetryCondition>().is_err());
    }

    #[tokio::test]
    async fn test_successful_on_first_attempt() {
        let strategy = quiet(RetryPolicy::exponential(3, Duration::from_millis(10), 2.0));
        let counter = AtomicU32::new(0);

        let result = strategy
            .execute(|| {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, Failure>(count) }
            })
            .await
            .unwrap();

        assert_eq!(result, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(strategy.stats().retries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_twice_then_succeeds() {
        let strategy = quiet(RetryPolicy::exponential(3, Duration::from_millis(100), 2.0));
        let counter = AtomicU32::new(0);
        let start = Instant::now();

        let result = strategy
            .execute(|| {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if count < 2 {
                        Err(Failure::network("Temporary failure"))
                    } else {
                        Ok("tiles")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "tiles");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert_eq!(strategy.stats().retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_retries_exhausted_surfaces_last_error() {
        let strategy = quiet(RetryPolicy::exponential(2, Duration::from_millis(10), 2.0));
        let counter = AtomicU32::new(0);

        let result = strategy
            .execute(|| {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                async move { Err::<(), _>(Failure::network(format!("failure #{}", count))) }
            })
            .await;

        match result {
            Err(ResilienceError::RetriesExhausted { attempts, source, .. }) => {
                assert_eq!(attempts, 3);
                assert_eq!(source.message, "failure #2");
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
        assert_eq!(strategy.stats().exhausted, 1);
    }

    #[tokio::test]
    async fn test_non_retryable_stops_early() {
        let strategy = quiet(RetryPolicy::exponential(5, Duration::from_millis(10), 2.0));
        let counter = AtomicU32::new(0);

        let result = strategy
            .execute(|| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(Failure::type_error("x is not a function")) }
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::NotRetryable { attempts: 1, .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_timeout_condition() {
        let policy = RetryPolicy::exponential(3, Duration::from_millis(10), 2.0)
            .with_condition(RetryCondition::OnTimeout);
        let strategy = quiet(policy);

        let network = strategy
            .execute(|| async { Err::<(), _>(Failure::network("offline")) })
            .await;
        assert!(matches!(network, Err(ResilienceError::NotRetryable { .. })));

        let timeout = strategy
            .execute(|| async { Err::<(), _>(Failure::timeout("slow")) })
            .await;
        assert!(matches!(timeout, Err(ResilienceError::RetriesExhausted { attempts: 4, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_condition() {
        let policy = RetryPolicy::exponential(5, Duration::from_millis(10), 2.0)
            .with_condition(RetryCondition::Custom);
        let strategy = quiet(policy).with_custom_condition(Arc::new(|_: &Failure, attempt: u32| attempt < 2));
        let counter = AtomicU32::new(0);

        let result = strategy
            .execute(|| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(Failure::network("offline")) }
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::NotRetryable { attempts: 2, .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callbacks_fire_and_panics_are_contained() {
        let retries = Arc::new(AtomicU32::new(0));
        let exhausted = Arc::new(AtomicU32::new(0));
        let retries_sink = retries.clone();
        let exhausted_sink = exhausted.clone();

        let callbacks = RetryCallbacks {
            on_retry: Some(Arc::new(move |_: &Failure, _: u32, _: Duration| {
                retries_sink.fetch_add(1, Ordering::SeqCst);
            })),
            on_failure: Some(Arc::new(|_: &Failure, _: u32, _: Duration| {
                panic!("observer bug")
            })),
            on_max_retries_exceeded: Some(Arc::new(move |_: &Failure, max: u32| {
                exhausted_sink.fetch_add(max, Ordering::SeqCst);
            })),
            ..Default::default()
        };
        let strategy = quiet(RetryPolicy::exponential(2, Duration::from_millis(5), 2.0))
            .with_callbacks(callbacks);

        let result = strategy
            .execute(|| async { Err::<(), _>(Failure::network("down")) })
            .await;

        assert!(result.is_err());
        assert_eq!(retries.load(Ordering::SeqCst), 2);
        assert_eq!(exhausted.load(Ordering::SeqCst), 2);
    }

    proptest! {
        #[test]
        fn prop_backoff_is_monotonic_and_capped(
            initial_ms in 1u64..5_000,
            extra_ms in 0u64..60_000,
            multiplier in 1.0f64..4.0,
        ) {
            let policy = RetryPolicy::exponential(20, Duration::from_millis(initial_ms), multiplier)
                .with_max_delay(Duration::from_millis(initial_ms + extra_ms));

            let mut previous = Duration::ZERO;
            for attempt in 2..24 {
                let delay = policy.base_delay(attempt);
                prop_assert!(delay >= previous);
                prop_assert!(delay <= policy.max_delay);
                previous = delay;
            }
        }

        #[test]
        fn prop_jitter_stays_in_bounds(
            delay_ms in 0u64..100_000,
            factor in 0.0f64..=1.0,
            seed in any::<u64>(),
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let delay = Duration::from_millis(delay_ms);
            let jittered = apply_jitter(delay, factor, &mut rng);

            let base = delay.as_nanos() as f64;
            let lower = (base * (1.0 - factor)).floor().max(0.0) as u128;
            let upper = (base * (1.0 + factor)).ceil() as u128;
            prop_assert!(jittered.as_nanos() >= lower);
            prop_assert!(jittered.as_nanos() <= upper);
        }
    }
}
