//! Property-based tests for classification and backoff

use proptest::prelude::*;
use std::time::Duration;

use wayfinder_core::classifier::{ErrorClassifier, ErrorType, RecoveryStrategy};
use wayfinder_core::context::ContextPriority;
use wayfinder_core::{ErrorContext, Failure, RetryPolicy};

fn failure_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Error".to_string()),
        Just("TypeError".to_string()),
        Just("NetworkError".to_string()),
        Just("TimeoutError".to_string()),
        "[A-Za-z]{1,12}",
    ]
}

fn failure_message() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Failed to fetch".to_string()),
        Just("Request timeout after 5000ms".to_string()),
        Just("invalid schema at /features/0".to_string()),
        Just("403 Forbidden".to_string()),
        Just("Unexpected token < in JSON".to_string()),
        "[ -~]{0,40}",
    ]
}

fn context() -> impl Strategy<Value = ErrorContext> {
    (
        prop::option::of("[a-z]{1,8}"),
        prop::option::of("(fetch|load|render|http)[A-Z][a-z]{0,6}"),
        prop::bool::ANY,
    )
        .prop_map(|(component, operation, critical)| {
            let mut context = ErrorContext::new();
            context.component = component;
            context.operation = operation;
            if critical {
                context.priority = ContextPriority::Critical;
            }
            context
        })
}

proptest! {
    #[test]
    fn prop_classification_is_deterministic(
        name in failure_name(),
        message in failure_message(),
        context in context(),
    ) {
        let classifier = ErrorClassifier::new();
        let failure = Failure::new(name, message);

        let first = classifier.classify(&failure, &context);
        for _ in 0..3 {
            let again = classifier.classify(&failure, &context);
            prop_assert!(first.same_outcome(&again));
        }
    }

    #[test]
    fn prop_timeout_wins_over_network(prefix in "[a-z ]{0,10}", suffix in "[a-z ]{0,10}") {
        let failure = Failure::error(format!("{}network timeout{}", prefix, suffix));
        let classification = ErrorClassifier::new().classify(&failure, &ErrorContext::new());
        prop_assert_eq!(classification.error_type, ErrorType::Timeout);
        prop_assert!(classification.retryable);
    }

    #[test]
    fn prop_abort_is_never_retryable(message in failure_message(), context in context()) {
        let classification = ErrorClassifier::new().classify(&Failure::type_error(message), &context);
        if classification.strategy == RecoveryStrategy::Abort {
            prop_assert!(!classification.retryable);
        }
    }

    #[test]
    fn prop_backoff_never_exceeds_cap(
        initial_ms in 1u64..2_000,
        cap_ms in 2_000u64..60_000,
        multiplier in 1.0f64..10.0,
        attempt in 1u32..200,
    ) {
        let policy = RetryPolicy::exponential(10, Duration::from_millis(initial_ms), multiplier)
            .with_max_delay(Duration::from_millis(cap_ms));
        let delay = policy.base_delay(attempt);
        prop_assert!(delay <= policy.max_delay);
        prop_assert!(policy.base_delay(attempt + 1) >= delay);
    }
}
