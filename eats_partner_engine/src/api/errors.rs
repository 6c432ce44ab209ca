use thiserror::Error;

use crate::{
    db_types::OrderId,
    lifecycle::LifecycleError,
    traits::{EventApiError, OrderApiError, TokenStoreError},
};

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error(transparent)]
    IllegalTransition(#[from] LifecycleError),
}

impl From<OrderApiError> for OrderFlowError {
    fn from(e: OrderApiError) -> Self {
        match e {
            OrderApiError::OrderNotFound(oid) => OrderFlowError::OrderNotFound(oid),
            // The per-order lock means a version conflict can only come from a direct write bypassing the engine.
            OrderApiError::VersionConflict(oid) => {
                OrderFlowError::DatabaseError(format!("Concurrent modification of order {oid}"))
            },
            OrderApiError::DatabaseError(e) => OrderFlowError::DatabaseError(e),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum EventFlowError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Event with id {0} does not exist")]
    EventNotFound(i64),
    #[error("Unknown webhook event type: {0}")]
    UnknownEventType(String),
    #[error("Malformed event payload: {0}")]
    MalformedPayload(String),
    #[error(transparent)]
    IllegalTransition(LifecycleError),
    #[error("The partner rejected an outbound call: {0}")]
    GatewayRejected(String),
    #[error("Transient dependency failure: {0}")]
    Transient(String),
    #[error("Event {0} is in state {1} and cannot be retried")]
    InvalidRetryState(i64, String),
}

impl EventFlowError {
    /// Transient failures are retried with backoff; everything else fails the event permanently.
    pub fn is_transient(&self) -> bool {
        matches!(self, EventFlowError::Transient(_))
    }
}

impl From<EventApiError> for EventFlowError {
    fn from(e: EventApiError) -> Self {
        match e {
            EventApiError::EventNotFound(id) => EventFlowError::EventNotFound(id),
            EventApiError::DatabaseError(e) => EventFlowError::DatabaseError(e),
            EventApiError::QueryError(e) => EventFlowError::MalformedPayload(e),
        }
    }
}

impl From<OrderFlowError> for EventFlowError {
    fn from(e: OrderFlowError) -> Self {
        match e {
            // The order store being unreachable is retryable; a cancel or status update arriving ahead of its
            // notification is too, since the notification is usually seconds behind.
            OrderFlowError::DatabaseError(e) => EventFlowError::Transient(e),
            OrderFlowError::OrderNotFound(oid) => EventFlowError::Transient(format!("Order {oid} is not known yet")),
            OrderFlowError::IllegalTransition(e) => EventFlowError::IllegalTransition(e),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum TokenError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("The partner rejected the client credentials: {0}")]
    CredentialsRejected(String),
    #[error("Re-authentication required: {0}")]
    ReauthRequired(String),
    #[error("Transient failure during token exchange: {0}")]
    Transient(String),
}

impl From<TokenStoreError> for TokenError {
    fn from(e: TokenStoreError) -> Self {
        match e {
            TokenStoreError::DatabaseError(e) => TokenError::DatabaseError(e),
        }
    }
}
