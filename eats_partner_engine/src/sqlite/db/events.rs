use chrono::{DateTime, Utc};
use log::debug;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{EventId, EventStatus, NewWebhookEvent, OrderId, WebhookEvent},
    traits::{EventApiError, EventQueryFilter, InsertEventResult},
};

/// The atomic, idempotent insert at the heart of the ingestion pipeline. Two concurrent deliveries of the same
/// `event_id` race on the unique constraint; exactly one row is created and the loser sees `Duplicate`.
pub async fn idempotent_insert(
    event: NewWebhookEvent,
    conn: &mut SqliteConnection,
) -> Result<InsertEventResult, EventApiError> {
    let now = Utc::now();
    let res = sqlx::query(
        r#"
            INSERT INTO webhook_events (event_id, event_type, order_id, payload, received_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (event_id) DO NOTHING;
        "#,
    )
    .bind(&event.event_id)
    .bind(&event.event_type)
    .bind(&event.order_id)
    .bind(&event.payload)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    let inserted = res.rows_affected() > 0;
    let record = fetch_event_by_event_id(&event.event_id, conn)
        .await?
        .ok_or_else(|| EventApiError::DatabaseError(format!("Event {} vanished after insert", event.event_id)))?;
    if inserted {
        debug!("🗃️📨️ Event [{}] ({}) stored", record.event_id, record.event_type);
        Ok(InsertEventResult::Inserted(record))
    } else {
        debug!("🗃️📨️ Event [{}] is a duplicate delivery", record.event_id);
        Ok(InsertEventResult::Duplicate(record))
    }
}

pub async fn fetch_event(id: i64, conn: &mut SqliteConnection) -> Result<Option<WebhookEvent>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM webhook_events WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_event_by_event_id(
    event_id: &EventId,
    conn: &mut SqliteConnection,
) -> Result<Option<WebhookEvent>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM webhook_events WHERE event_id = $1")
        .bind(event_id.as_str())
        .fetch_optional(conn)
        .await
}

/// Fetches events according to criteria specified in the `EventQueryFilter`, newest first.
pub async fn search_events(
    query: EventQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<WebhookEvent>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM webhook_events ");
    let (limit, offset) = (query.effective_limit(), query.effective_offset());
    let has_criteria =
        query.status.is_some() || query.event_type.is_some() || query.order_id.is_some() || query.since.is_some();
    if has_criteria {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(status) = query.status {
        where_clause.push("status = ");
        where_clause.push_bind_unseparated(status.as_str());
    }
    if let Some(event_type) = query.event_type {
        where_clause.push("event_type = ");
        where_clause.push_bind_unseparated(event_type);
    }
    if let Some(order_id) = query.order_id {
        where_clause.push("order_id = ");
        where_clause.push_bind_unseparated(order_id.as_str().to_string());
    }
    if let Some(since) = query.since {
        where_clause.push("received_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    builder.push(" ORDER BY received_at DESC LIMIT ");
    builder.push_bind(limit);
    builder.push(" OFFSET ");
    builder.push_bind(offset);
    let events = builder.build_query_as().fetch_all(conn).await?;
    Ok(events)
}

pub async fn fetch_events_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<WebhookEvent>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM webhook_events WHERE order_id = $1 ORDER BY received_at ASC")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await
}

/// Marks the event as being worked on. The attempt counter includes the run being started, so an event that
/// succeeds first time finishes with `attempts = 1`.
pub async fn mark_processing(id: i64, conn: &mut SqliteConnection) -> Result<WebhookEvent, EventApiError> {
    let event: Option<WebhookEvent> = sqlx::query_as(
        r#"
            UPDATE webhook_events
            SET status = 'PROCESSING', attempts = attempts + 1, updated_at = $1
            WHERE id = $2
            RETURNING *;
        "#,
    )
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(conn)
    .await?;
    event.ok_or(EventApiError::EventNotFound(id))
}

pub async fn mark_processed(
    id: i64,
    note: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<WebhookEvent, EventApiError> {
    let event: Option<WebhookEvent> = sqlx::query_as(
        r#"
            UPDATE webhook_events
            SET status = 'PROCESSED', last_error = $1, processed_at = $2, updated_at = $2, next_attempt_at = NULL
            WHERE id = $3
            RETURNING *;
        "#,
    )
    .bind(note)
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(conn)
    .await?;
    event.ok_or(EventApiError::EventNotFound(id))
}

pub async fn mark_failed(id: i64, error: &str, conn: &mut SqliteConnection) -> Result<WebhookEvent, EventApiError> {
    set_status(id, EventStatus::Failed, Some(error.to_string()), conn).await
}

pub async fn mark_retrying(
    id: i64,
    next_attempt_at: DateTime<Utc>,
    error: &str,
    conn: &mut SqliteConnection,
) -> Result<WebhookEvent, EventApiError> {
    let event: Option<WebhookEvent> = sqlx::query_as(
        r#"
            UPDATE webhook_events
            SET status = 'RETRYING', next_attempt_at = $1, last_error = $2, updated_at = $3
            WHERE id = $4
            RETURNING *;
        "#,
    )
    .bind(next_attempt_at)
    .bind(error)
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(conn)
    .await?;
    event.ok_or(EventApiError::EventNotFound(id))
}

/// Events that were still in flight (pending, retrying, or stuck in processing) when the process last stopped.
pub async fn fetch_incomplete_events(conn: &mut SqliteConnection) -> Result<Vec<WebhookEvent>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM webhook_events WHERE status IN ('PENDING', 'PROCESSING', 'RETRYING') ORDER BY received_at ASC",
    )
    .fetch_all(conn)
    .await
}

/// Re-arms a failed or retrying event. The attempt counter survives unless the operator explicitly asks for a reset.
pub async fn reset_for_retry(
    id: i64,
    reset_attempts: bool,
    conn: &mut SqliteConnection,
) -> Result<WebhookEvent, EventApiError> {
    let event: Option<WebhookEvent> = sqlx::query_as(
        r#"
            UPDATE webhook_events
            SET status = 'PENDING',
                attempts = CASE WHEN $1 THEN 0 ELSE attempts END,
                next_attempt_at = NULL,
                updated_at = $2
            WHERE id = $3
            RETURNING *;
        "#,
    )
    .bind(reset_attempts)
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(conn)
    .await?;
    event.ok_or(EventApiError::EventNotFound(id))
}

async fn set_status(
    id: i64,
    status: EventStatus,
    error: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<WebhookEvent, EventApiError> {
    let event: Option<WebhookEvent> = sqlx::query_as(
        r#"
            UPDATE webhook_events
            SET status = $1, last_error = COALESCE($2, last_error), updated_at = $3
            WHERE id = $4
            RETURNING *;
        "#,
    )
    .bind(status.as_str())
    .bind(error)
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(conn)
    .await?;
    event.ok_or(EventApiError::EventNotFound(id))
}
