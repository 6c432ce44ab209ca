use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{EventId, NewWebhookEvent, OrderId, WebhookEvent},
    traits::{EventQueryFilter, InsertEventResult},
};

#[derive(Debug, Clone, Error)]
pub enum EventApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Event with id {0} does not exist")]
    EventNotFound(i64),
    #[error("User error constructing query: {0}")]
    QueryError(String),
}

impl From<sqlx::Error> for EventApiError {
    fn from(e: sqlx::Error) -> Self {
        EventApiError::DatabaseError(e.to_string())
    }
}

/// Storage contract for the durable webhook event record.
///
/// [`insert_event`] is the single synchronisation point of the ingestion path: the store must guarantee, via a
/// unique constraint on `event_id` or an equivalent conditional insert, that two concurrent deliveries of the same
/// event produce exactly one row.
#[allow(async_fn_in_trait)]
pub trait EventManagement: Clone {
    /// Idempotently stores a new event with `Pending` status. Returns `Duplicate` with the existing record when the
    /// event_id has been seen before.
    async fn insert_event(&self, event: NewWebhookEvent) -> Result<InsertEventResult, EventApiError>;

    async fn fetch_event(&self, id: i64) -> Result<Option<WebhookEvent>, EventApiError>;

    async fn fetch_event_by_event_id(&self, event_id: &EventId) -> Result<Option<WebhookEvent>, EventApiError>;

    /// Fetches events according to the filter, newest first.
    async fn search_events(&self, query: EventQueryFilter) -> Result<Vec<WebhookEvent>, EventApiError>;

    /// The audit trail for an order, oldest first.
    async fn fetch_events_for_order(&self, order_id: &OrderId) -> Result<Vec<WebhookEvent>, EventApiError>;

    /// Marks the event as being worked on and counts the attempt.
    async fn mark_event_processing(&self, id: i64) -> Result<WebhookEvent, EventApiError>;

    /// Marks the event as successfully handled. Terminal.
    async fn mark_event_processed(&self, id: i64, note: Option<String>) -> Result<WebhookEvent, EventApiError>;

    /// Marks the event as permanently failed. Terminal; the record stays visible for audit and manual retry.
    async fn mark_event_failed(&self, id: i64, error: &str) -> Result<WebhookEvent, EventApiError>;

    /// Records a failed attempt and schedules the next one.
    async fn mark_event_retrying(
        &self,
        id: i64,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<WebhookEvent, EventApiError>;

    /// Re-arms a failed or retrying event for another processing run, optionally zeroing its attempt count.
    async fn reset_event_for_retry(&self, id: i64, reset_attempts: bool) -> Result<WebhookEvent, EventApiError>;

    /// Events that were mid-pipeline when the process last stopped, for re-queueing at startup.
    async fn fetch_incomplete_events(&self) -> Result<Vec<WebhookEvent>, EventApiError>;
}
