//! Outbound side effects: the event bus and user notifications
//!
//! The orchestrator only ever calls [`EventBus::emit`]; it never subscribes
//! to its own events. User-facing notifications go through the
//! [`Notifier`] capability so no recovery code touches a UI directly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

pub const EVENT_DEGRADATION: &str = "error:degradation";
pub const EVENT_BREAKER_OPEN: &str = "circuitBreaker:open";
pub const EVENT_BREAKER_HALF_OPEN: &str = "circuitBreaker:halfOpen";
pub const EVENT_BREAKER_RESET: &str = "circuitBreaker:reset";

/// Fire-and-forget event sink
pub trait EventBus: Send + Sync {
    fn emit(&self, event: &str, payload: Value);
}

/// Drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventBus;

impl EventBus for NoopEventBus {
    fn emit(&self, _event: &str, _payload: Value) {}
}

/// Writes events to the tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventBus;

impl EventBus for TracingEventBus {
    fn emit(&self, event: &str, payload: Value) {
        debug!(event, %payload, "event emitted");
    }
}

/// An emitted event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    pub name: String,
    pub payload: Value,
}

/// Fans events out to any number of tokio subscribers
#[derive(Debug, Clone)]
pub struct BroadcastEventBus {
    sender: broadcast::Sender<BusEvent>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus for BroadcastEventBus {
    fn emit(&self, event: &str, payload: Value) {
        // No subscribers is not an error
        let _ = self.sender.send(BusEvent {
            name: event.to_string(),
            payload,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// A message meant for the person using the application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
    pub component: Option<String>,
}

impl Notification {
    pub fn new(level: NotificationLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
            component: None,
        }
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }
}

/// Capability for surfacing notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification);
}

/// Logs notifications instead of showing them
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, n: Notification) {
        let component = n.component.as_deref().unwrap_or("-");
        match n.level {
            NotificationLevel::Info => info!(component, "{}: {}", n.title, n.message),
            NotificationLevel::Warning => warn!(component, "{}: {}", n.title, n.message),
            NotificationLevel::Error => error!(component, "{}: {}", n.title, n.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_broadcast_bus_delivers_to_subscribers() {
        let bus = BroadcastEventBus::new(8);
        let mut rx = bus.subscribe();

        bus.emit(EVENT_BREAKER_OPEN, json!({ "key": "tiles" }));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, "circuitBreaker:open");
        assert_eq!(event.payload["key"], "tiles");
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = BroadcastEventBus::default();
        bus.emit(EVENT_DEGRADATION, json!({}));
        NoopEventBus.emit(EVENT_DEGRADATION, json!({}));
        TracingEventBus.emit(EVENT_DEGRADATION, json!({}));
    }

    #[tokio::test]
    async fn test_tracing_notifier_accepts_every_level() {
        for level in [NotificationLevel::Info, NotificationLevel::Warning, NotificationLevel::Error] {
            TracingNotifier
                .notify(Notification::new(level, "Tiles", "tile server slow").with_component("map"))
                .await;
        }
    }
}
