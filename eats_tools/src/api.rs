use std::{sync::Arc, time::Duration};

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{
    config::EatsConfig,
    data_objects::{
        AcceptOrderRequest,
        CancelOrderRequest,
        CreateDeliveryRequest,
        Delivery,
        DeliveryQuote,
        DeliveryQuoteRequest,
        DenyOrderRequest,
        IntrospectionResponse,
        MarkReadyRequest,
        TokenResponse,
    },
    EatsApiError,
};

/// Thin typed client over the partner platform's REST API.
///
/// Every order/delivery call takes the bearer token as an argument rather than holding credential state; token
/// lifecycle management lives upstream so that this client stays a dumb pipe.
#[derive(Clone)]
pub struct EatsApi {
    config: EatsConfig,
    client: Arc<Client>,
}

impl EatsApi {
    pub fn new(config: EatsConfig) -> Result<Self, EatsApiError> {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| EatsApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn config(&self) -> &EatsConfig {
        &self.config
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        token: &str,
        body: Option<B>,
    ) -> Result<T, EatsApiError> {
        let url = format!("{}{path}", self.config.base_url);
        trace!("Sending REST query: {url}");
        let mut req = self.client.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(classify_send_error)?;
        if response.status().is_success() {
            trace!("REST query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| EatsApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| EatsApiError::RestResponseError(e.to_string()))?;
            Err(EatsApiError::QueryError { status, message })
        }
    }

    //----------------------------------------   OAuth endpoints  -----------------------------------------------------

    /// Client-credentials token exchange against the partner's auth server.
    pub async fn exchange_token(&self, scope: &str) -> Result<TokenResponse, EatsApiError> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.reveal().as_str()),
            ("scope", scope),
        ];
        self.auth_query(&self.config.auth_url, &form).await
    }

    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, EatsApiError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.reveal().as_str()),
        ];
        self.auth_query(&self.config.auth_url, &form).await
    }

    /// Best-effort revocation. The auth server replies 200 even for unknown tokens, so any 2xx is success.
    pub async fn revoke_token(&self, token: &str) -> Result<(), EatsApiError> {
        let form = [
            ("token", token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.reveal().as_str()),
        ];
        let response = self
            .client
            .post(self.config.revoke_url())
            .form(&form)
            .send()
            .await
            .map_err(classify_send_error)?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| EatsApiError::RestResponseError(e.to_string()))?;
            Err(EatsApiError::QueryError { status, message })
        }
    }

    pub async fn introspect_token(&self, token: &str) -> Result<IntrospectionResponse, EatsApiError> {
        let form = [
            ("token", token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.reveal().as_str()),
        ];
        self.auth_query(&self.config.introspect_url(), &form).await
    }

    async fn auth_query<T: DeserializeOwned>(&self, url: &str, form: &[(&str, &str)]) -> Result<T, EatsApiError> {
        trace!("Sending auth query: {url}");
        let response = self.client.post(url).form(form).send().await.map_err(classify_send_error)?;
        if response.status().is_success() {
            response.json::<T>().await.map_err(|e| EatsApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| EatsApiError::RestResponseError(e.to_string()))?;
            Err(EatsApiError::QueryError { status, message })
        }
    }

    //----------------------------------------   Order actions  -------------------------------------------------------

    pub async fn accept_order(
        &self,
        token: &str,
        order_id: &str,
        req: &AcceptOrderRequest,
    ) -> Result<Value, EatsApiError> {
        debug!("Accepting order {order_id} with the partner (prep time {}m)", req.estimated_prep_time_minutes);
        self.rest_query(Method::POST, &format!("/v1/eats/orders/{order_id}/accept"), token, Some(req)).await
    }

    pub async fn deny_order(&self, token: &str, order_id: &str, req: &DenyOrderRequest) -> Result<Value, EatsApiError> {
        debug!("Denying order {order_id} with the partner. Reason: {}", req.reason);
        self.rest_query(Method::POST, &format!("/v1/eats/orders/{order_id}/deny"), token, Some(req)).await
    }

    pub async fn cancel_order(
        &self,
        token: &str,
        order_id: &str,
        req: &CancelOrderRequest,
    ) -> Result<Value, EatsApiError> {
        debug!("Cancelling order {order_id} with the partner. Reason: {}", req.reason);
        self.rest_query(Method::POST, &format!("/v1/eats/orders/{order_id}/cancel"), token, Some(req)).await
    }

    pub async fn mark_order_ready(
        &self,
        token: &str,
        order_id: &str,
        req: &MarkReadyRequest,
    ) -> Result<Value, EatsApiError> {
        debug!("Marking order {order_id} ready for pickup with the partner");
        self.rest_query(Method::POST, &format!("/v1/eats/orders/{order_id}/ready"), token, Some(req)).await
    }

    //----------------------------------------   Deliveries  ----------------------------------------------------------

    pub async fn delivery_quote(&self, token: &str, req: &DeliveryQuoteRequest) -> Result<DeliveryQuote, EatsApiError> {
        self.rest_query(Method::POST, "/v1/eats/deliveries/estimate", token, Some(req)).await
    }

    pub async fn create_delivery(&self, token: &str, req: &CreateDeliveryRequest) -> Result<Delivery, EatsApiError> {
        self.rest_query(Method::POST, "/v1/eats/deliveries", token, Some(req)).await
    }
}

fn classify_send_error(e: reqwest::Error) -> EatsApiError {
    if e.is_timeout() {
        EatsApiError::Timeout(e.to_string())
    } else {
        EatsApiError::RestResponseError(e.to_string())
    }
}
