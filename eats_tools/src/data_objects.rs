use chrono::{DateTime, Utc};
use epg_common::Money;
use serde::{Deserialize, Serialize};

//--------------------------------------   OAuth wire objects  --------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime of the access token in seconds.
    pub expires_in: i64,
    #[serde(default)]
    pub scope: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub exp: Option<i64>,
}

//--------------------------------------   Order action requests  -----------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct AcceptOrderRequest {
    pub reason: String,
    pub estimated_prep_time_minutes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenyOrderRequest {
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelOrderRequest {
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarkReadyRequest {
    pub ready_for_pickup_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<String>,
}

//--------------------------------------   Delivery wire objects  -----------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryQuoteRequest {
    pub store_id: String,
    pub dropoff_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryQuote {
    pub quote_id: String,
    /// Courier fee in minor currency units.
    pub fee: Money,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateDeliveryRequest {
    pub quote_id: String,
    pub order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_instructions: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Delivery {
    pub delivery_id: String,
    pub order_id: String,
    pub status: String,
    #[serde(default)]
    pub courier_name: Option<String>,
    #[serde(default)]
    pub tracking_url: Option<String>,
}
