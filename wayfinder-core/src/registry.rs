//! Per-key circuit breakers and retry strategies
//!
//! One [`CircuitBreaker`] and one [`RetryStrategy`] per operation key,
//! created lazily on first use and kept until removed. The registry is an
//! ordinary value owned by the application root and passed by reference;
//! keys are independent and share no locks.

use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitBreakerState,
    StateChangeCallback,
};
use crate::classifier::ErrorClassifier;
use crate::events::{
    EventBus, NoopEventBus, EVENT_BREAKER_HALF_OPEN, EVENT_BREAKER_OPEN, EVENT_BREAKER_RESET,
};
use crate::history::MetricsCollector;
use crate::retry::{RetryCallbacks, RetryPolicy, RetryPredicate, RetryStats, RetryStrategy};

pub struct ResilienceRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    strategies: DashMap<String, Arc<RetryStrategy>>,
    breaker_config: CircuitBreakerConfig,
    retry_policy: RetryPolicy,
    classifier: ErrorClassifier,
    retry_callbacks: RetryCallbacks,
    custom_condition: Option<RetryPredicate>,
    state_listener: Option<StateChangeCallback>,
    events: Arc<dyn EventBus>,
    metrics: Arc<MetricsCollector>,
    enable_logging: bool,
}

impl std::fmt::Debug for ResilienceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceRegistry")
            .field("breakers", &self.breakers.len())
            .field("strategies", &self.strategies.len())
            .field("breaker_config", &self.breaker_config)
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

impl Default for ResilienceRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default(), RetryPolicy::default())
    }
}

impl ResilienceRegistry {
    pub fn new(breaker_config: CircuitBreakerConfig, retry_policy: RetryPolicy) -> Self {
        Self {
            breakers: DashMap::new(),
            strategies: DashMap::new(),
            enable_logging: breaker_config.enable_logging,
            breaker_config,
            retry_policy,
            classifier: ErrorClassifier::new(),
            retry_callbacks: RetryCallbacks::default(),
            custom_condition: None,
            state_listener: None,
            events: Arc::new(NoopEventBus),
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    pub fn with_event_bus(mut self, events: Arc<dyn EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Callbacks given to every retry strategy created from now on
    pub fn with_retry_callbacks(mut self, callbacks: RetryCallbacks) -> Self {
        self.retry_callbacks = callbacks;
        self
    }

    /// Predicate for [`RetryCondition::Custom`](crate::retry::RetryCondition::Custom)
    pub fn with_custom_condition(mut self, predicate: RetryPredicate) -> Self {
        self.custom_condition = Some(predicate);
        self
    }

    /// Extra `(key, old, new)` listener for every breaker
    pub fn with_state_listener(mut self, listener: StateChangeCallback) -> Self {
        self.state_listener = Some(listener);
        self
    }

    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self.breaker_config.enable_logging &= enable;
        self
    }

    pub fn breaker_config(&self) -> &CircuitBreakerConfig {
        &self.breaker_config
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Breaker for `key`, created with the registry defaults
    pub fn breaker(&self, key: &str) -> Arc<CircuitBreaker> {
        self.breaker_with(key, None)
    }

    /// Breaker for `key`. `config` only applies if the breaker does not exist yet.
    pub fn breaker_with(&self, key: &str, config: Option<&CircuitBreakerConfig>) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(key) {
            return existing.value().clone();
        }
        self.breakers
            .entry(key.to_string())
            .or_insert_with(|| {
                let mut config = config.cloned().unwrap_or_else(|| self.breaker_config.clone());
                config.enable_logging = config.enable_logging && self.enable_logging;
                if self.enable_logging {
                    info!("Creating circuit breaker for '{}'", key);
                }
                Arc::new(CircuitBreaker::new(key, config).with_state_listener(self.transition_listener()))
            })
            .value()
            .clone()
    }

    /// Retry strategy for `key`, created with the registry defaults
    pub fn retry_strategy(&self, key: &str) -> Arc<RetryStrategy> {
        if let Some(existing) = self.strategies.get(key) {
            return existing.value().clone();
        }
        self.strategies
            .entry(key.to_string())
            .or_insert_with(|| {
                let mut strategy = RetryStrategy::new(key, self.retry_policy.clone())
                    .with_classifier(self.classifier.clone())
                    .with_callbacks(self.retry_callbacks.clone())
                    .with_logging(self.enable_logging);
                if let Some(predicate) = &self.custom_condition {
                    strategy = strategy.with_custom_condition(predicate.clone());
                }
                Arc::new(strategy)
            })
            .value()
            .clone()
    }

    fn transition_listener(&self) -> StateChangeCallback {
        let events = self.events.clone();
        let metrics = self.metrics.clone();
        let extra = self.state_listener.clone();
        Arc::new(move |key: &str, old: CircuitBreakerState, new: CircuitBreakerState| {
            let event = match new {
                CircuitBreakerState::Open => EVENT_BREAKER_OPEN,
                CircuitBreakerState::HalfOpen => EVENT_BREAKER_HALF_OPEN,
                CircuitBreakerState::Closed => EVENT_BREAKER_RESET,
            };
            metrics.record_transition(key, new);
            events.emit(event, json!({ "key": key, "from": old, "to": new }));
            if let Some(listener) = &extra {
                listener(key, old, new);
            }
        })
    }

    /// Close the breaker for `key`. Returns false for unknown keys.
    pub fn reset(&self, key: &str) -> bool {
        match self.breakers.get(key) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        for breaker in self.breakers.iter() {
            breaker.reset();
        }
    }

    /// Forget the breaker and strategy for `key`
    pub fn remove(&self, key: &str) -> bool {
        let breaker = self.breakers.remove(key).is_some();
        let strategy = self.strategies.remove(key).is_some();
        breaker || strategy
    }

    /// Breaker for `key` if one has been created
    pub fn existing_breaker(&self, key: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.breakers.contains_key(key)
    }

    /// Snapshots of every breaker, sorted by key
    pub fn breaker_snapshots(&self) -> Vec<CircuitBreakerSnapshot> {
        let mut snapshots: Vec<_> = self.breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.key.cmp(&b.key));
        snapshots
    }

    /// Retry stats for every strategy, sorted by key
    pub fn retry_stats(&self) -> Vec<(String, RetryStats)> {
        let mut stats: Vec<_> = self
            .strategies
            .iter()
            .map(|s| (s.key().clone(), s.stats()))
            .collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }
}
