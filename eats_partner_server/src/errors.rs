use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use eats_partner_engine::{EventFlowError, OrderFlowError, TokenError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Webhook signature invalid or not provided")]
    SignatureVerificationFailed,
    #[error("Missing or invalid API key")]
    InvalidApiKey,
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("The requested transition is not legal. {0}")]
    IllegalTransition(String),
    #[error("The request is not valid. {0}")]
    ValidationError(String),
    #[error("The partner platform could not complete the call. {0}")]
    PartnerUnavailable(String),
    #[error("The partner platform rejected the call. {0}")]
    PartnerRejected(String),
    #[error("Authentication with the partner failed. {0}")]
    PartnerAuthError(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::SignatureVerificationFailed => StatusCode::UNAUTHORIZED,
            Self::InvalidApiKey => StatusCode::UNAUTHORIZED,
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::IllegalTransition(_) => StatusCode::CONFLICT,
            Self::PartnerUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::PartnerRejected(_) => StatusCode::BAD_GATEWAY,
            Self::PartnerAuthError(_) => StatusCode::BAD_GATEWAY,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<EventFlowError> for ServerError {
    fn from(e: EventFlowError) -> Self {
        match e {
            EventFlowError::EventNotFound(id) => Self::NoRecordFound(format!("Event #{id}")),
            EventFlowError::MalformedPayload(m) => Self::InvalidRequestBody(m),
            EventFlowError::UnknownEventType(t) => Self::ValidationError(format!("Unknown event type {t}")),
            EventFlowError::InvalidRetryState(id, s) => {
                Self::ValidationError(format!("Event #{id} is {s} and cannot be retried"))
            },
            EventFlowError::IllegalTransition(e) => Self::IllegalTransition(e.to_string()),
            EventFlowError::GatewayRejected(m) => Self::PartnerRejected(m),
            EventFlowError::Transient(m) => Self::PartnerUnavailable(m),
            EventFlowError::DatabaseError(m) => Self::BackendError(m),
        }
    }
}

impl From<OrderFlowError> for ServerError {
    fn from(e: OrderFlowError) -> Self {
        match e {
            OrderFlowError::OrderNotFound(oid) => Self::NoRecordFound(format!("Order {oid}")),
            OrderFlowError::IllegalTransition(e) => Self::IllegalTransition(e.to_string()),
            OrderFlowError::DatabaseError(m) => Self::BackendError(m),
        }
    }
}

impl From<TokenError> for ServerError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::CredentialsRejected(m) | TokenError::ReauthRequired(m) => Self::PartnerAuthError(m),
            TokenError::Transient(m) => Self::PartnerUnavailable(m),
            TokenError::DatabaseError(m) => Self::BackendError(m),
        }
    }
}
