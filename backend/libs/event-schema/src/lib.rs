//! Event schemas shared across the analytics ingestion paths
//!
//! This library defines the per-event-type field schemas used to validate
//! incoming analytics payloads, and the canonical envelope for events
//! arriving from other services over the message broker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// Schema registry and validation
pub mod schema;

// Re-export commonly used types
pub use schema::{EventSchema, FieldType, SchemaRegistry, ValidationError, ValidationRule};

/// Canonical shape of an event originating from another service
/// (billing, auth, payments, ...) and delivered over the broker.
///
/// The broker envelope is a JSON object; `timestamp` defaults to receipt
/// time when the producing service omitted it, and an omitted `id` decodes
/// as empty. Correlation ids are assigned downstream at dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossServiceEvent {
    #[serde(default)]
    pub id: String,
    /// Producing service, e.g. "billing", "auth", "payments"
    pub source: String,
    /// Routing key, e.g. "auth.user.login", "billing.payment.completed"
    pub event_type: String,
    pub user_id: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Service-specific payload
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl CrossServiceEvent {
    pub fn new(
        source: impl Into<String>,
        event_type: impl Into<String>,
        user_id: impl Into<String>,
        data: Map<String, Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            event_type: event_type.into(),
            user_id: user_id.into(),
            timestamp: Utc::now(),
            data,
            correlation_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cross_service_event_creation() {
        let mut data = Map::new();
        data.insert("amount".to_string(), json!(29.99));
        data.insert("plan".to_string(), json!("pro"));

        let event = CrossServiceEvent::new(
            "billing",
            "billing.user.subscription.created",
            "user123",
            data,
        );

        assert!(!event.id.is_empty());
        assert_eq!(event.source, "billing");
        assert_eq!(event.event_type, "billing.user.subscription.created");
        assert_eq!(event.user_id, "user123");
        assert!(event.correlation_id.is_none());
    }

    #[test]
    fn test_envelope_deserialization() {
        let json = r#"{
            "source": "auth",
            "event_type": "auth.user.login",
            "user_id": "user123",
            "timestamp": "2024-01-01T00:00:00Z",
            "data": {"ip_address": "192.168.1.1"},
            "correlation_id": "corr-42"
        }"#;

        let event: CrossServiceEvent = serde_json::from_str(json).expect("Failed to parse");

        assert_eq!(event.source, "auth");
        assert_eq!(event.event_type, "auth.user.login");
        assert_eq!(event.correlation_id.as_deref(), Some("corr-42"));
        assert_eq!(event.data["ip_address"], "192.168.1.1");
    }

    #[test]
    fn test_envelope_without_id_or_timestamp() {
        let json = r#"{
            "source": "payments",
            "event_type": "payments.refund.processed",
            "user_id": "user456",
            "data": {}
        }"#;

        let event: CrossServiceEvent = serde_json::from_str(json).expect("Failed to parse");

        assert!(event.id.is_empty());
        assert!(event.correlation_id.is_none());
        // Timestamp defaults to receipt time
        assert!(event.timestamp <= Utc::now());
    }
}
