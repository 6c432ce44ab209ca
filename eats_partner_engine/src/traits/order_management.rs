use chrono::Duration;
use thiserror::Error;

use crate::{
    db_types::{NewOrder, Order, OrderId},
    traits::OrderUpdate,
};

#[derive(Debug, Clone, Error)]
pub enum OrderApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Order {0} was modified concurrently (version mismatch)")]
    VersionConflict(OrderId),
}

impl From<sqlx::Error> for OrderApiError {
    fn from(e: sqlx::Error) -> Self {
        OrderApiError::DatabaseError(e.to_string())
    }
}

/// Storage contract for order records.
///
/// Order status is only ever written through [`update_order_status`], which enforces the version counter: the write
/// carries the version the caller read, and the row is only updated (with `version + 1`) if it still matches.
#[allow(async_fn_in_trait)]
pub trait OrderManagement: Clone {
    /// Idempotently stores a new order with `Pending` status and version 1. Returns the order and `true` if it was
    /// inserted, or the existing record and `false` if the order_id was already known.
    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), OrderApiError>;

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, OrderApiError>;

    /// Commits a lifecycle transition. Increments the version counter. Fails with `VersionConflict` if the stored
    /// version no longer matches `expected_version`.
    async fn update_order_status(
        &self,
        order_id: &OrderId,
        update: OrderUpdate,
        expected_version: i64,
    ) -> Result<Order, OrderApiError>;

    /// Returns `Pending` orders whose acceptance window (measured from `created_at`) has elapsed.
    async fn fetch_timed_out_orders(&self, window: Duration) -> Result<Vec<Order>, OrderApiError>;
}
