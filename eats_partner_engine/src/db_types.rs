use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use epg_common::Money;
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value for {0}: {1}")]
pub struct ConversionError(pub &'static str, pub String);

//--------------------------------------        OrderId        -------------------------------------------------------
/// The partner-assigned order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------        EventId        -------------------------------------------------------
/// The partner-assigned webhook event identifier. Globally unique in the event store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct EventId(pub String);

impl From<String> for EventId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl EventId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------   OrderStatusType     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatusType {
    /// The order has been received from the partner and is awaiting an accept/deny decision.
    Pending,
    /// The merchant has accepted the order and supplied an ETA.
    Accepted,
    /// The merchant has declined the order.
    Denied,
    /// The kitchen is working on the order.
    Preparing,
    /// The order is ready for courier pickup.
    ReadyForPickup,
    /// A courier has collected the order.
    Dispatched,
    /// The order has reached the customer.
    Delivered,
    /// The order was cancelled, by either side.
    Cancelled,
    /// The order could not be fulfilled.
    Failed,
}

impl OrderStatusType {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Denied | Self::Delivered | Self::Cancelled | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::Denied => "DENIED",
            Self::Preparing => "PREPARING",
            Self::ReadyForPickup => "READY_FOR_PICKUP",
            Self::Dispatched => "DISPATCHED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
            Self::Failed => "FAILED",
        }
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "ACCEPTED" => Ok(Self::Accepted),
            "DENIED" => Ok(Self::Denied),
            "PREPARING" => Ok(Self::Preparing),
            "READY_FOR_PICKUP" => Ok(Self::ReadyForPickup),
            "DISPATCHED" => Ok(Self::Dispatched),
            "DELIVERED" => Ok(Self::Delivered),
            "CANCELLED" => Ok(Self::Cancelled),
            "FAILED" => Ok(Self::Failed),
            s => Err(ConversionError("order status", s.to_string())),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Pending");
            OrderStatusType::Pending
        })
    }
}

//--------------------------------------     CancelReason      -------------------------------------------------------
/// Reason codes attached to denials, cancellations and failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelReason {
    CustomerRequested,
    MerchantRejected,
    MerchantUnavailable,
    ItemsUnavailable,
    DeliveryIssue,
    PaymentFailed,
    Fraud,
    /// The acceptance window elapsed without an accept/deny decision.
    OrderTimeout,
    Other,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CustomerRequested => "CUSTOMER_REQUESTED",
            Self::MerchantRejected => "MERCHANT_REJECTED",
            Self::MerchantUnavailable => "MERCHANT_UNAVAILABLE",
            Self::ItemsUnavailable => "ITEMS_UNAVAILABLE",
            Self::DeliveryIssue => "DELIVERY_ISSUE",
            Self::PaymentFailed => "PAYMENT_FAILED",
            Self::Fraud => "FRAUD",
            Self::OrderTimeout => "ORDER_TIMEOUT",
            Self::Other => "OTHER",
        }
    }
}

impl Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CancelReason {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CUSTOMER_REQUESTED" => Ok(Self::CustomerRequested),
            "MERCHANT_REJECTED" => Ok(Self::MerchantRejected),
            "MERCHANT_UNAVAILABLE" => Ok(Self::MerchantUnavailable),
            "ITEMS_UNAVAILABLE" => Ok(Self::ItemsUnavailable),
            "DELIVERY_ISSUE" => Ok(Self::DeliveryIssue),
            "PAYMENT_FAILED" => Ok(Self::PaymentFailed),
            "FRAUD" => Ok(Self::Fraud),
            "ORDER_TIMEOUT" => Ok(Self::OrderTimeout),
            "OTHER" => Ok(Self::Other),
            s => Err(ConversionError("cancel reason", s.to_string())),
        }
    }
}

//--------------------------------------      EventStatus      -------------------------------------------------------
/// Processing status of a stored webhook event. `Processed` and `Failed` are terminal; both are retained for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Pending,
    Processing,
    Processed,
    Failed,
    Retrying,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Processed => "PROCESSED",
            Self::Failed => "FAILED",
            Self::Retrying => "RETRYING",
        }
    }
}

impl Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//--------------------------------------   WebhookEventType    -------------------------------------------------------
/// The closed set of webhook event types the gateway understands. The raw string is retained on the stored event so
/// that unrecognised types can still be recorded (and marked failed) for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventType {
    OrderNotification,
    ScheduledOrderNotification,
    OrderCancel,
    OrderStatusUpdate,
    FulfillmentIssue,
    StoreStatus,
    StoreProvisioned,
    StoreDeprovisioned,
}

impl WebhookEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderNotification => "orders.notification",
            Self::ScheduledOrderNotification => "orders.scheduled_notification",
            Self::OrderCancel => "orders.cancel",
            Self::OrderStatusUpdate => "orders.status_update",
            Self::FulfillmentIssue => "orders.fulfillment_issue",
            Self::StoreStatus => "store.status",
            Self::StoreProvisioned => "store.provisioned",
            Self::StoreDeprovisioned => "store.deprovisioned",
        }
    }
}

impl Display for WebhookEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WebhookEventType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "orders.notification" => Ok(Self::OrderNotification),
            "orders.scheduled_notification" => Ok(Self::ScheduledOrderNotification),
            "orders.cancel" => Ok(Self::OrderCancel),
            "orders.status_update" => Ok(Self::OrderStatusUpdate),
            "orders.fulfillment_issue" => Ok(Self::FulfillmentIssue),
            "store.status" => Ok(Self::StoreStatus),
            "store.provisioned" => Ok(Self::StoreProvisioned),
            "store.deprovisioned" => Ok(Self::StoreDeprovisioned),
            s => Err(ConversionError("webhook event type", s.to_string())),
        }
    }
}

//--------------------------------------        Order          -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub store_id: String,
    pub status: OrderStatusType,
    pub total_price: Money,
    /// Estimated preparation time in minutes, set when the order is accepted.
    pub eta_minutes: Option<i64>,
    pub cancellation_reason: Option<CancelReason>,
    /// Increments on every accepted transition. Events carrying an older snapshot are discarded as stale.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------       NewOrder        -------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// The order id as assigned by the partner platform
    pub order_id: OrderId,
    /// The store the order was placed against
    pub store_id: String,
    /// The order total in minor currency units
    pub total_price: Money,
    /// The time the order was placed on the partner platform
    pub placed_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn new(order_id: OrderId, store_id: String, total_price: Money) -> Self {
        Self { order_id, store_id, total_price, placed_at: Utc::now() }
    }
}

//--------------------------------------     WebhookEvent      -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: i64,
    pub event_id: EventId,
    /// The raw event type string. Parse with [`WebhookEventType::from_str`] at dispatch time; unknown strings are
    /// stored so that the failure is auditable.
    pub event_type: String,
    pub order_id: Option<OrderId>,
    /// The raw JSON envelope as received
    pub payload: String,
    pub status: EventStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------   NewWebhookEvent     -------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewWebhookEvent {
    pub event_id: EventId,
    pub event_type: String,
    pub order_id: Option<OrderId>,
    pub payload: String,
}

impl NewWebhookEvent {
    pub fn new(event_id: EventId, event_type: impl Into<String>, payload: impl Into<String>) -> Self {
        Self { event_id, event_type: event_type.into(), order_id: None, payload: payload.into() }
    }

    pub fn with_order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }
}

//--------------------------------------      AuthToken        -------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct AuthToken {
    pub id: i64,
    /// The client/user the token was issued for
    pub subject: String,
    /// Canonicalised, space-separated scope set
    pub scopes: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl AuthToken {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now
    }
}

//--------------------------------------     NewAuthToken      -------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewAuthToken {
    pub subject: String,
    pub scopes: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}
