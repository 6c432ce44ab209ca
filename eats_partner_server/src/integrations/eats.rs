//! Adapters between the engine's outbound traits and the partner's REST client.
//!
//! [`EatsExchange`] speaks the OAuth endpoints for the token manager; [`EatsGateway`] carries the order lifecycle
//! notifications and the courier passthrough, acquiring a token from the token manager for every call. Nothing else
//! in the server talks to the partner platform.

use chrono::Utc;
use eats_partner_engine::{
    db_types::{CancelReason, OrderId},
    traits::{
        CourierDelivery,
        CourierGateway,
        CourierQuote,
        GatewayError,
        PartnerGateway,
        TokenExchange,
        TokenGrant,
        TokenStore,
    },
    TokenApi,
    TokenError,
};
use eats_tools::{
    AcceptOrderRequest,
    CancelOrderRequest,
    CreateDeliveryRequest,
    DeliveryQuoteRequest,
    DenyOrderRequest,
    EatsApi,
    EatsApiError,
    MarkReadyRequest,
};
use log::*;

fn gateway_error(e: EatsApiError) -> GatewayError {
    if e.is_transient() {
        GatewayError::Transient(e.to_string())
    } else if let EatsApiError::QueryError { status, message } = e {
        GatewayError::Rejected { status, message }
    } else {
        GatewayError::Rejected { status: 400, message: e.to_string() }
    }
}

fn token_error(e: TokenError) -> GatewayError {
    match e {
        TokenError::Transient(m) => GatewayError::Transient(m),
        // The credential store being down is as retryable as the partner being down
        TokenError::DatabaseError(m) => GatewayError::Transient(m),
        TokenError::CredentialsRejected(m) | TokenError::ReauthRequired(m) => {
            GatewayError::Rejected { status: 401, message: m }
        },
    }
}

//--------------------------------------      EatsExchange      -------------------------------------------------------

/// OAuth operations over the partner auth server, as the engine's [`TokenExchange`] seam.
#[derive(Clone)]
pub struct EatsExchange {
    api: EatsApi,
}

impl EatsExchange {
    pub fn new(api: EatsApi) -> Self {
        Self { api }
    }
}

impl TokenExchange for EatsExchange {
    async fn exchange(&self, subject: &str, scopes: &str) -> Result<TokenGrant, GatewayError> {
        trace!("🤝️ Exchanging client credentials for {subject} [{scopes}]");
        let response = self.api.exchange_token(scopes).await.map_err(gateway_error)?;
        Ok(TokenGrant {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_in: response.expires_in,
            scope: response.scope,
        })
    }

    async fn refresh(&self, subject: &str, refresh_token: &str) -> Result<TokenGrant, GatewayError> {
        trace!("🤝️ Refreshing token for {subject}");
        let response = self.api.refresh_token(refresh_token).await.map_err(gateway_error)?;
        Ok(TokenGrant {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_in: response.expires_in,
            scope: response.scope,
        })
    }

    async fn revoke(&self, access_token: &str) -> Result<(), GatewayError> {
        self.api.revoke_token(access_token).await.map_err(gateway_error)
    }
}

//--------------------------------------       EatsGateway      -------------------------------------------------------

/// The Outbound Gateway. Every call attaches a token acquired from the token manager, so an expired credential is
/// refreshed (once, shared across concurrent callers) rather than failing the call.
pub struct EatsGateway<B: TokenStore> {
    api: EatsApi,
    tokens: TokenApi<B, EatsExchange>,
    subject: String,
    scopes: String,
}

impl<B: TokenStore> Clone for EatsGateway<B> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            tokens: self.tokens.clone(),
            subject: self.subject.clone(),
            scopes: self.scopes.clone(),
        }
    }
}

impl<B: TokenStore> EatsGateway<B> {
    pub fn new(api: EatsApi, tokens: TokenApi<B, EatsExchange>, subject: &str, scopes: &str) -> Self {
        Self { api, tokens, subject: subject.to_string(), scopes: scopes.to_string() }
    }

    async fn bearer(&self) -> Result<String, GatewayError> {
        let token = self.tokens.acquire(&self.subject, &self.scopes).await.map_err(token_error)?;
        Ok(token.access_token)
    }
}

impl<B: TokenStore> PartnerGateway for EatsGateway<B> {
    async fn notify_accept(&self, order_id: &OrderId, eta_minutes: i64) -> Result<(), GatewayError> {
        let token = self.bearer().await?;
        let req = AcceptOrderRequest { reason: "Order accepted".to_string(), estimated_prep_time_minutes: eta_minutes };
        self.api.accept_order(&token, order_id.as_str(), &req).await.map_err(gateway_error)?;
        Ok(())
    }

    async fn notify_deny(&self, order_id: &OrderId, reason: CancelReason) -> Result<(), GatewayError> {
        let token = self.bearer().await?;
        let req = DenyOrderRequest { reason: reason.to_string(), explanation: None };
        self.api.deny_order(&token, order_id.as_str(), &req).await.map_err(gateway_error)?;
        Ok(())
    }

    async fn notify_ready(&self, order_id: &OrderId) -> Result<(), GatewayError> {
        let token = self.bearer().await?;
        let req = MarkReadyRequest { ready_for_pickup_at: Utc::now(), special_instructions: None };
        self.api.mark_order_ready(&token, order_id.as_str(), &req).await.map_err(gateway_error)?;
        Ok(())
    }

    async fn notify_cancel(&self, order_id: &OrderId, reason: CancelReason) -> Result<(), GatewayError> {
        let token = self.bearer().await?;
        let req = CancelOrderRequest { reason: reason.to_string(), explanation: None };
        self.api.cancel_order(&token, order_id.as_str(), &req).await.map_err(gateway_error)?;
        Ok(())
    }
}

impl<B: TokenStore> CourierGateway for EatsGateway<B> {
    async fn delivery_quote(&self, store_id: &str, dropoff_address: &str) -> Result<CourierQuote, GatewayError> {
        let token = self.bearer().await?;
        let req = DeliveryQuoteRequest { store_id: store_id.to_string(), dropoff_address: dropoff_address.to_string() };
        let quote = self.api.delivery_quote(&token, &req).await.map_err(gateway_error)?;
        Ok(CourierQuote { quote_id: quote.quote_id, fee: quote.fee, expires_at: quote.expires_at })
    }

    async fn create_delivery(
        &self,
        quote_id: &str,
        order_id: &OrderId,
        pickup_instructions: Option<String>,
    ) -> Result<CourierDelivery, GatewayError> {
        let token = self.bearer().await?;
        let req = CreateDeliveryRequest {
            quote_id: quote_id.to_string(),
            order_id: order_id.as_str().to_string(),
            pickup_instructions,
        };
        let delivery = self.api.create_delivery(&token, &req).await.map_err(gateway_error)?;
        Ok(CourierDelivery {
            delivery_id: delivery.delivery_id,
            order_id: OrderId::from(delivery.order_id),
            status: delivery.status,
            courier_name: delivery.courier_name,
            tracking_url: delivery.tracking_url,
        })
    }
}
