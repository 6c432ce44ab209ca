use eats_partner_engine::db_types::{CancelReason, EventId};
use serde::{Deserialize, Serialize};

/// The acknowledgment every webhook sender receives, successful or duplicate. The partner platform only needs to
/// know the delivery landed; processing state is the operator API's business.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub event_id: EventId,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Into<String>>(message: S) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failure<S: Into<String>>(message: S) -> Self {
        Self { success: false, message: message.into() }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RetryParams {
    #[serde(default)]
    pub reset_attempts: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AcceptParams {
    pub eta_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReasonParams {
    pub reason: CancelReason,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ResolveIssueParams {
    pub recoverable: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubjectParams {
    pub subject: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntrospectParams {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryQuoteParams {
    pub store_id: String,
    pub dropoff_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDeliveryParams {
    pub quote_id: String,
    pub order_id: String,
    #[serde(default)]
    pub pickup_instructions: Option<String>,
}
