use serde::Serialize;

use crate::db_types::{Order, OrderStatusType, WebhookEvent};

/// Published whenever an order transition is committed.
#[derive(Debug, Clone, Serialize)]
pub struct OrderStateChanged {
    pub order: Order,
    pub old_status: OrderStatusType,
    pub new_status: OrderStatusType,
}

impl OrderStateChanged {
    pub fn new(order: Order, old_status: OrderStatusType) -> Self {
        let new_status = order.status;
        Self { order, old_status, new_status }
    }
}

/// Published when an event exhausts its retries or fails permanently, so operators can be alerted.
#[derive(Debug, Clone, Serialize)]
pub struct EventProcessingFailed {
    pub event: WebhookEvent,
    pub reason: String,
}

impl EventProcessingFailed {
    pub fn new(event: WebhookEvent, reason: impl Into<String>) -> Self {
        Self { event, reason: reason.into() }
    }
}
