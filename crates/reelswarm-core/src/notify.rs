//! Live progress notifications.
//!
//! A [`NotificationSink`] is fire-and-forget: `emit` never fails back into
//! the caller. Sinks serialize their own delivery.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Category of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Info,
    Agent,
    Success,
    Warning,
    Error,
    DataUpdate,
}

/// One entry of the live log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Notification {
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            kind,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Best-effort notification channel.
pub trait NotificationSink: Send + Sync {
    fn emit(&self, notification: Notification);

    fn info(&self, message: &str) {
        self.emit(Notification::new(NotificationKind::Info, message));
    }

    fn warning(&self, message: &str) {
        self.emit(Notification::new(NotificationKind::Warning, message));
    }

    fn error(&self, message: &str) {
        self.emit(Notification::new(NotificationKind::Error, message));
    }

    fn success(&self, message: &str) {
        self.emit(Notification::new(NotificationKind::Success, message));
    }
}

/// Forwards notifications to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn emit(&self, n: Notification) {
        match n.kind {
            NotificationKind::Warning => warn!(kind = "warning", "{}", n.message),
            NotificationKind::Error => error!(kind = "error", "{}", n.message),
            NotificationKind::DataUpdate => debug!(kind = "data_update", "{}", n.message),
            NotificationKind::Agent => info!(kind = "agent", "{}", n.message),
            NotificationKind::Success => info!(kind = "success", "{}", n.message),
            NotificationKind::Info => info!(kind = "info", "{}", n.message),
        }
    }
}

/// Fans notifications out to any number of live subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl NotificationSink for BroadcastSink {
    fn emit(&self, notification: Notification) {
        // No subscribers is not an error.
        let _ = self.tx.send(notification);
    }
}

/// Delivers to every inner sink.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }
}

impl NotificationSink for FanoutSink {
    fn emit(&self, notification: Notification) {
        for sink in &self.sinks {
            sink.emit(notification.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_format_uses_type_key() {
        let n = Notification::new(NotificationKind::DataUpdate, "script ready")
            .with_payload(json!({"step": "final_script"}));
        let value = serde_json::to_value(&n).unwrap();
        assert_eq!(value["type"], "data_update");
        assert_eq!(value["payload"]["step"], "final_script");
        assert!(value.get("timestamp").is_some());
    }

    #[test]
    fn fanout_delivers_to_every_sink() {
        let first = Arc::new(crate::fakes::MemorySink::new());
        let second = Arc::new(crate::fakes::MemorySink::new());
        let sinks: Vec<Arc<dyn NotificationSink>> = vec![first.clone(), second.clone()];
        let fanout = FanoutSink::new(sinks);

        fanout.warning("Narrator used a fallback");
        fanout.info("Entering media");

        for sink in [&first, &second] {
            assert_eq!(sink.count(NotificationKind::Warning), 1);
            assert_eq!(sink.messages(NotificationKind::Info), vec!["Entering media"]);
        }
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_is_silent() {
        let sink = BroadcastSink::new(8);
        sink.info("nobody listening");

        let mut rx = sink.subscribe();
        sink.warning("now someone is");
        let got = rx.recv().await.unwrap();
        assert_eq!(got.kind, NotificationKind::Warning);
        assert_eq!(got.message, "now someone is");
    }
}
