use chrono::{DateTime, Utc};
use epg_common::Money;
use serde::Serialize;
use thiserror::Error;

use crate::db_types::{CancelReason, OrderId};

/// Failure of an outbound partner call, classified for retry purposes. Network errors, timeouts and 5xx responses
/// are transient; 4xx responses are permanent and must be surfaced, never retried.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Transient partner failure: {0}")]
    Transient(String),
    #[error("Partner rejected the call with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}

/// A successful token grant from the partner's auth server.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime in seconds.
    pub expires_in: i64,
    /// The scope set actually granted, space-separated.
    pub scope: String,
}

/// OAuth operations against the partner's auth server. Implemented by the server's integration adapter; the engine's
/// token manager drives it and owns all credential state.
#[allow(async_fn_in_trait)]
pub trait TokenExchange: Clone {
    /// Client-credentials exchange for the given subject and canonical scope set.
    async fn exchange(&self, subject: &str, scopes: &str) -> Result<TokenGrant, GatewayError>;

    async fn refresh(&self, subject: &str, refresh_token: &str) -> Result<TokenGrant, GatewayError>;

    /// Best-effort revocation on the partner side.
    async fn revoke(&self, access_token: &str) -> Result<(), GatewayError>;
}

/// Order lifecycle notifications to the partner platform. Every implementation attaches a token obtained from the
/// token manager; no other component may call the partner.
#[allow(async_fn_in_trait)]
pub trait PartnerGateway: Clone {
    async fn notify_accept(&self, order_id: &OrderId, eta_minutes: i64) -> Result<(), GatewayError>;

    async fn notify_deny(&self, order_id: &OrderId, reason: CancelReason) -> Result<(), GatewayError>;

    async fn notify_ready(&self, order_id: &OrderId) -> Result<(), GatewayError>;

    async fn notify_cancel(&self, order_id: &OrderId, reason: CancelReason) -> Result<(), GatewayError>;
}

/// A courier fee quote from the partner's delivery service.
#[derive(Debug, Clone, Serialize)]
pub struct CourierQuote {
    pub quote_id: String,
    pub fee: Money,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourierDelivery {
    pub delivery_id: String,
    pub order_id: OrderId,
    pub status: String,
    pub courier_name: Option<String>,
    pub tracking_url: Option<String>,
}

/// The opaque quote/courier service. The gateway only ever forwards quotes and delivery requests; routing couriers
/// is entirely the partner's problem.
#[allow(async_fn_in_trait)]
pub trait CourierGateway: Clone {
    async fn delivery_quote(&self, store_id: &str, dropoff_address: &str) -> Result<CourierQuote, GatewayError>;

    async fn create_delivery(
        &self,
        quote_id: &str,
        order_id: &OrderId,
        pickup_instructions: Option<String>,
    ) -> Result<CourierDelivery, GatewayError>;
}
