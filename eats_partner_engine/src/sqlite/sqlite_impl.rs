//! `SqliteDatabase` is a concrete implementation of an Eats Partner Gateway backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the storage traits defined in the [`crate::traits`]
//! module.
use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use super::db::{events, new_pool, orders, tokens};
use crate::{
    db_types::{AuthToken, EventId, NewAuthToken, NewOrder, NewWebhookEvent, Order, OrderId, WebhookEvent},
    traits::{
        EventApiError,
        EventManagement,
        EventQueryFilter,
        GatewayDatabase,
        InsertEventResult,
        OrderApiError,
        OrderManagement,
        OrderUpdate,
        TokenStore,
        TokenStoreError,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object with a connection pool of size `max_connections`.
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl EventManagement for SqliteDatabase {
    async fn insert_event(&self, event: NewWebhookEvent) -> Result<InsertEventResult, EventApiError> {
        let mut conn = self.pool.acquire().await?;
        events::idempotent_insert(event, &mut conn).await
    }

    async fn fetch_event(&self, id: i64) -> Result<Option<WebhookEvent>, EventApiError> {
        let mut conn = self.pool.acquire().await?;
        Ok(events::fetch_event(id, &mut conn).await?)
    }

    async fn fetch_event_by_event_id(&self, event_id: &EventId) -> Result<Option<WebhookEvent>, EventApiError> {
        let mut conn = self.pool.acquire().await?;
        Ok(events::fetch_event_by_event_id(event_id, &mut conn).await?)
    }

    async fn search_events(&self, query: EventQueryFilter) -> Result<Vec<WebhookEvent>, EventApiError> {
        let mut conn = self.pool.acquire().await?;
        Ok(events::search_events(query, &mut conn).await?)
    }

    async fn fetch_events_for_order(&self, order_id: &OrderId) -> Result<Vec<WebhookEvent>, EventApiError> {
        let mut conn = self.pool.acquire().await?;
        Ok(events::fetch_events_for_order(order_id, &mut conn).await?)
    }

    async fn mark_event_processing(&self, id: i64) -> Result<WebhookEvent, EventApiError> {
        let mut conn = self.pool.acquire().await?;
        events::mark_processing(id, &mut conn).await
    }

    async fn mark_event_processed(&self, id: i64, note: Option<String>) -> Result<WebhookEvent, EventApiError> {
        let mut conn = self.pool.acquire().await?;
        events::mark_processed(id, note, &mut conn).await
    }

    async fn mark_event_failed(&self, id: i64, error: &str) -> Result<WebhookEvent, EventApiError> {
        let mut conn = self.pool.acquire().await?;
        events::mark_failed(id, error, &mut conn).await
    }

    async fn mark_event_retrying(
        &self,
        id: i64,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<WebhookEvent, EventApiError> {
        let mut conn = self.pool.acquire().await?;
        events::mark_retrying(id, next_attempt_at, error, &mut conn).await
    }

    async fn reset_event_for_retry(&self, id: i64, reset_attempts: bool) -> Result<WebhookEvent, EventApiError> {
        let mut conn = self.pool.acquire().await?;
        events::reset_for_retry(id, reset_attempts, &mut conn).await
    }

    async fn fetch_incomplete_events(&self) -> Result<Vec<WebhookEvent>, EventApiError> {
        let mut conn = self.pool.acquire().await?;
        Ok(events::fetch_incomplete_events(&mut conn).await?)
    }
}

impl OrderManagement for SqliteDatabase {
    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), OrderApiError> {
        let mut conn = self.pool.acquire().await?;
        orders::idempotent_insert(order, &mut conn).await
    }

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, OrderApiError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_order_id(order_id, &mut conn).await?)
    }

    async fn update_order_status(
        &self,
        order_id: &OrderId,
        update: OrderUpdate,
        expected_version: i64,
    ) -> Result<Order, OrderApiError> {
        let mut conn = self.pool.acquire().await?;
        orders::update_order_status(order_id, update, expected_version, &mut conn).await
    }

    async fn fetch_timed_out_orders(&self, window: Duration) -> Result<Vec<Order>, OrderApiError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_timed_out_orders(window, &mut conn).await?)
    }
}

impl TokenStore for SqliteDatabase {
    async fn fetch_token(&self, subject: &str, scopes: &str) -> Result<Option<AuthToken>, TokenStoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(tokens::fetch_token(subject, scopes, &mut conn).await?)
    }

    async fn fetch_latest_token_for_subject(&self, subject: &str) -> Result<Option<AuthToken>, TokenStoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(tokens::fetch_latest_token_for_subject(subject, &mut conn).await?)
    }

    async fn fetch_token_by_access_token(&self, access_token: &str) -> Result<Option<AuthToken>, TokenStoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(tokens::fetch_token_by_access_token(access_token, &mut conn).await?)
    }

    async fn store_token(&self, token: NewAuthToken) -> Result<AuthToken, TokenStoreError> {
        let mut tx = self.pool.begin().await?;
        let record = tokens::replace_token(token, &mut tx).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn revoke_tokens_for_subject(&self, subject: &str) -> Result<u64, TokenStoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(tokens::revoke_tokens_for_subject(subject, &mut conn).await?)
    }
}

impl GatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }
}
