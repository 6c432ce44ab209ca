//! Wire types for the partner platform's webhook envelope.
//!
//! Every delivery is a JSON document `{ "metadata": {...}, "data": {...} }`. The metadata block identifies the event;
//! the shape of `data` depends on the event type and is only parsed at dispatch time, so a malformed body for one
//! event type never blocks ingestion of others.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::db_types::{CancelReason, OrderStatusType};

#[derive(Debug, Clone, Deserialize)]
pub struct EventMetadata {
    pub event_id: String,
    pub event_type: String,
    pub event_time: DateTime<Utc>,
    #[serde(default)]
    pub resource_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    pub metadata: EventMetadata,
    #[serde(default)]
    pub data: Value,
}

impl WebhookEnvelope {
    /// Best-effort extraction of the order id from the data block, for the event audit trail.
    pub fn order_id(&self) -> Option<String> {
        self.data.get("order_id").and_then(|v| v.as_str()).map(|s| s.to_string())
    }
}

//--------------------------------------   Per-event-type data  -------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct OrderNotificationData {
    pub order_id: String,
    pub store_id: String,
    /// Order total in major currency units, as the partner sends it.
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub placed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderCancelData {
    pub order_id: String,
    pub cancel_reason: CancelReason,
    #[serde(default)]
    pub cancel_details: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderStatusUpdateData {
    pub order_id: String,
    pub new_status: OrderStatusType,
    /// The order version the partner believes it is updating. Older than the stored version means the delivery is
    /// stale and is discarded.
    #[serde(default)]
    pub order_version: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FulfillmentIssueData {
    pub order_id: String,
    pub issue_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreEventData {
    pub store_id: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn envelope_roundtrip() {
        let raw = r#"{
            "metadata": {
                "event_id": "evt-100",
                "event_type": "orders.notification",
                "event_time": "2024-05-01T10:00:00Z",
                "resource_id": "ord-1"
            },
            "data": { "order_id": "ord-1", "store_id": "store-9", "total": 23.50 }
        }"#;
        let envelope: WebhookEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.metadata.event_id, "evt-100");
        assert_eq!(envelope.metadata.event_type, "orders.notification");
        assert_eq!(envelope.order_id().as_deref(), Some("ord-1"));
        let data: OrderNotificationData = serde_json::from_value(envelope.data).unwrap();
        assert_eq!(data.store_id, "store-9");
        assert_eq!(data.total, Some(23.50));
    }

    #[test]
    fn status_update_data_parses_screaming_snake_status() {
        let raw = r#"{ "order_id": "ord-1", "new_status": "READY_FOR_PICKUP", "order_version": 3 }"#;
        let data: OrderStatusUpdateData = serde_json::from_str(raw).unwrap();
        assert_eq!(data.new_status, OrderStatusType::ReadyForPickup);
        assert_eq!(data.order_version, Some(3));
    }

    #[test]
    fn envelope_without_data_block_still_parses() {
        let raw = r#"{
            "metadata": {
                "event_id": "evt-101",
                "event_type": "store.provisioned",
                "event_time": "2024-05-01T10:00:00Z"
            }
        }"#;
        let envelope: WebhookEnvelope = serde_json::from_str(raw).unwrap();
        assert!(envelope.order_id().is_none());
    }
}
