use chrono::{Duration, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewOrder, Order, OrderId},
    traits::{OrderApiError, OrderUpdate},
};

/// Inserts the order into the database, returning `false` in the second parameter if the order already exists.
/// The insert is conditional on the unique `order_id` constraint, so two racing notifications for the same order
/// result in exactly one row.
pub async fn idempotent_insert(order: NewOrder, conn: &mut SqliteConnection) -> Result<(Order, bool), OrderApiError> {
    let now = Utc::now();
    let res = sqlx::query(
        r#"
            INSERT INTO orders (order_id, store_id, total_price, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_id) DO NOTHING;
        "#,
    )
    .bind(&order.order_id)
    .bind(&order.store_id)
    .bind(order.total_price.value())
    .bind(order.placed_at)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    let inserted = res.rows_affected() > 0;
    if inserted {
        debug!("🗃️📦️ Order [{}] inserted", order.order_id);
    }
    let record = fetch_order_by_order_id(&order.order_id, conn)
        .await?
        .ok_or_else(|| OrderApiError::OrderNotFound(order.order_id.clone()))?;
    Ok((record, inserted))
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// Commits a transition with an optimistic version check. The row is only written if the stored version still
/// matches `expected_version`; the version counter advances by one on success.
pub async fn update_order_status(
    order_id: &OrderId,
    update: OrderUpdate,
    expected_version: i64,
    conn: &mut SqliteConnection,
) -> Result<Order, OrderApiError> {
    let order: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders SET
                status = $1,
                eta_minutes = COALESCE($2, eta_minutes),
                cancellation_reason = COALESCE($3, cancellation_reason),
                version = version + 1,
                updated_at = $4
            WHERE order_id = $5 AND version = $6
            RETURNING *;
        "#,
    )
    .bind(update.status)
    .bind(update.eta_minutes)
    .bind(update.cancellation_reason)
    .bind(Utc::now())
    .bind(order_id.as_str())
    .bind(expected_version)
    .fetch_optional(&mut *conn)
    .await?;
    match order {
        Some(order) => {
            debug!("🗃️📦️ Order [{}] moved to {} (version {})", order.order_id, order.status, order.version);
            Ok(order)
        },
        None => match fetch_order_by_order_id(order_id, conn).await? {
            Some(_) => Err(OrderApiError::VersionConflict(order_id.clone())),
            None => Err(OrderApiError::OrderNotFound(order_id.clone())),
        },
    }
}

/// Pending orders whose acceptance window has already elapsed.
pub async fn fetch_timed_out_orders(window: Duration, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let cutoff = Utc::now() - window;
    let orders = sqlx::query_as("SELECT * FROM orders WHERE status = 'PENDING' AND created_at < $1")
        .bind(cutoff)
        .fetch_all(conn)
        .await?;
    Ok(orders)
}
