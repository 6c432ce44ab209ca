use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::db_types::{CancelReason, EventStatus, OrderId, OrderStatusType, WebhookEvent};

/// Result of the idempotent event insert. A duplicate delivery returns the already-stored record so the caller can
/// acknowledge it without re-triggering processing.
#[derive(Debug, Clone)]
pub enum InsertEventResult {
    Inserted(WebhookEvent),
    Duplicate(WebhookEvent),
}

impl InsertEventResult {
    pub fn event(&self) -> &WebhookEvent {
        match self {
            Self::Inserted(e) | Self::Duplicate(e) => e,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

/// The fields a committed lifecycle transition writes back to an order row.
#[derive(Debug, Clone)]
pub struct OrderUpdate {
    pub status: OrderStatusType,
    pub eta_minutes: Option<i64>,
    pub cancellation_reason: Option<CancelReason>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventQueryFilter {
    pub status: Option<EventStatus>,
    pub event_type: Option<String>,
    pub order_id: Option<OrderId>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl EventQueryFilter {
    const DEFAULT_LIMIT: i64 = 50;
    const MAX_LIMIT: i64 = 500;

    pub fn with_status(mut self, status: EventStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT)
    }

    pub fn effective_offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}
