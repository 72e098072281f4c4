//! Fallback and degraded-mode handler registry
//!
//! Handlers are keyed by component or operation id. A missing handler at
//! dispatch time is an ordinary failed recovery, not a programming error.

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::context::ErrorContext;
use crate::failure::Failure;

/// Async recovery handler receiving the failure and its context
pub type RecoveryHandler =
    Arc<dyn Fn(Failure, ErrorContext) -> BoxFuture<'static, Result<Value, Failure>> + Send + Sync>;

#[derive(Default)]
pub struct HandlerRegistry {
    fallback: DashMap<String, RecoveryHandler>,
    degrade: DashMap<String, RecoveryHandler>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut fallback: Vec<String> = self.fallback.iter().map(|e| e.key().clone()).collect();
        let mut degrade: Vec<String> = self.degrade.iter().map(|e| e.key().clone()).collect();
        fallback.sort();
        degrade.sort();
        f.debug_struct("HandlerRegistry")
            .field("fallback", &fallback)
            .field("degrade", &degrade)
            .finish()
    }
}

fn boxed<F, Fut>(handler: F) -> RecoveryHandler
where
    F: Fn(Failure, ErrorContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, Failure>> + Send + 'static,
{
    Arc::new(move |failure: Failure, context: ErrorContext| handler(failure, context).boxed())
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the fallback handler for `id`
    pub fn register_fallback_handler<F, Fut>(&self, id: impl Into<String>, handler: F)
    where
        F: Fn(Failure, ErrorContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Failure>> + Send + 'static,
    {
        self.fallback.insert(id.into(), boxed(handler));
    }

    /// Register (or replace) the degraded-mode handler for `id`
    pub fn register_degrade_handler<F, Fut>(&self, id: impl Into<String>, handler: F)
    where
        F: Fn(Failure, ErrorContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Failure>> + Send + 'static,
    {
        self.degrade.insert(id.into(), boxed(handler));
    }

    pub fn unregister(&self, id: &str) {
        self.fallback.remove(id);
        self.degrade.remove(id);
    }

    /// First fallback handler registered under any of `ids`
    pub fn fallback_for(&self, ids: &[&str]) -> Option<RecoveryHandler> {
        lookup(&self.fallback, ids)
    }

    /// First degrade handler registered under any of `ids`
    pub fn degrade_for(&self, ids: &[&str]) -> Option<RecoveryHandler> {
        lookup(&self.degrade, ids)
    }
}

fn lookup(map: &DashMap<String, RecoveryHandler>, ids: &[&str]) -> Option<RecoveryHandler> {
    ids.iter()
        .find_map(|id| map.get(*id).map(|entry| entry.value().clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_lookup_prefers_first_matching_id() {
        let registry = HandlerRegistry::new();
        registry.register_fallback_handler("tiles", |_, _| async { Ok(json!("cached tiles")) });
        registry.register_fallback_handler("map", |_, _| async { Ok(json!("blank map")) });

        let handler = registry.fallback_for(&["tiles", "map"]).unwrap();
        let value = handler(Failure::network("offline"), ErrorContext::new()).await.unwrap();
        assert_eq!(value, json!("cached tiles"));

        let handler = registry.fallback_for(&["unknown", "map"]).unwrap();
        let value = handler(Failure::network("offline"), ErrorContext::new()).await.unwrap();
        assert_eq!(value, json!("blank map"));

        assert!(registry.degrade_for(&["tiles"]).is_none());
    }

    #[tokio::test]
    async fn test_handler_receives_context() {
        let registry = HandlerRegistry::new();
        registry.register_degrade_handler("sidebar", |failure, context| async move {
            Ok(json!({ "component": context.component, "error": failure.message }))
        });

        let handler = registry.degrade_for(&["sidebar"]).unwrap();
        let value = handler(
            Failure::error("forbidden"),
            ErrorContext::new().with_component("sidebar"),
        )
        .await
        .unwrap();
        assert_eq!(value["component"], "sidebar");
        assert_eq!(value["error"], "forbidden");

        registry.unregister("sidebar");
        assert!(registry.degrade_for(&["sidebar"]).is_none());
    }
}
