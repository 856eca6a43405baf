//! Real-time alert publishing.
//!
//! High-severity audit events are fanned out to subscribed operators. The
//! publisher is a port so deployments can bridge to an external pub/sub; the
//! in-process [`AlertHub`] backs the admin WebSocket stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::audit::event::{AuditEvent, AuditLevel};
use crate::error::AuditError;

/// Channel all security alerts are published on.
pub const SECURITY_EVENTS: &str = "security_events";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub category: String,
    pub message: String,
    pub level: AuditLevel,
    pub ip: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub details: Value,
}

impl From<&AuditEvent> for AlertPayload {
    fn from(event: &AuditEvent) -> Self {
        Self {
            category: event.category.clone(),
            message: event.message.clone(),
            level: event.level,
            ip: event.ip.clone(),
            timestamp: event.timestamp,
            details: event.details.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub channel: String,
    pub payload: AlertPayload,
}

pub trait AlertPublisher: Send + Sync {
    fn publish(&self, channel: &str, payload: &AlertPayload) -> Result<(), AuditError>;
}

/// Broadcast hub for in-process subscribers.
#[derive(Debug, Clone)]
pub struct AlertHub {
    tx: broadcast::Sender<Alert>,
}

impl AlertHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for AlertHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl AlertPublisher for AlertHub {
    fn publish(&self, channel: &str, payload: &AlertPayload) -> Result<(), AuditError> {
        // No subscribers is not an error; alerts are best-effort.
        let _ = self.tx.send(Alert {
            channel: channel.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::event::category;

    #[tokio::test]
    async fn test_hub_delivers_to_subscribers() {
        let hub = AlertHub::default();
        let mut rx = hub.subscribe();

        let event = AuditEvent::error(category::AUTO_BLOCK, "blocked").with_ip("5.5.5.5");
        hub.publish(SECURITY_EVENTS, &AlertPayload::from(&event)).unwrap();

        let alert = rx.recv().await.unwrap();
        assert_eq!(alert.channel, SECURITY_EVENTS);
        assert_eq!(alert.payload.category, "AUTO_BLOCK");
        assert_eq!(alert.payload.ip.as_deref(), Some("5.5.5.5"));
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let hub = AlertHub::default();
        let event = AuditEvent::error(category::BLOCKED_IP, "x");
        assert!(hub.publish(SECURITY_EVENTS, &AlertPayload::from(&event)).is_ok());
        assert_eq!(hub.subscriber_count(), 0);
    }
}
