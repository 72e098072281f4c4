//! Shared helpers for integration tests

#![allow(dead_code)]

use futures::future::{BoxFuture, FutureExt};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use wayfinder_core::{Failure, RecoveryOrchestrator, ResilienceConfig, RetryPolicy};

pub type TestOp = Box<dyn FnMut() -> BoxFuture<'static, Result<&'static str, Failure>> + Send>;

/// Configuration with logging off and short, jitter-free delays
pub fn quiet_config() -> ResilienceConfig {
    let mut config = ResilienceConfig::default();
    config.enable_logging = false;
    config.circuit_breaker.enable_logging = false;
    config.retry = RetryPolicy::exponential(3, Duration::from_millis(10), 2.0);
    config
}

pub fn orchestrator() -> RecoveryOrchestrator {
    RecoveryOrchestrator::new(quiet_config()).unwrap()
}

/// Operation failing with `failure` for its first `failures` calls, plus its call counter
pub fn flaky(failures: u32, failure: Failure) -> (Arc<AtomicU32>, TestOp) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let op: TestOp = Box::new(move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        let failure = failure.clone();
        async move {
            if n < failures {
                Err(failure)
            } else {
                Ok("ok")
            }
        }
        .boxed()
    });
    (calls, op)
}

pub fn always_fails(failure: Failure) -> (Arc<AtomicU32>, TestOp) {
    flaky(u32::MAX, failure)
}

pub fn calls(counter: &Arc<AtomicU32>) -> u32 {
    counter.load(Ordering::SeqCst)
}
