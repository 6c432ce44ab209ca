//! Webhook signature middleware.
//!
//! The partner platform signs every webhook delivery with HMAC-SHA256 over `"{timestamp}.{body}"`, and sends the
//! digest in the `X-Signature` header with the unix timestamp in `X-Timestamp`. This middleware verifies both before
//! the route handler runs, so an unauthenticated request never reaches the event store.
//!
//! Wrap the webhook scope with this middleware; the operator API uses the API key middleware instead.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorBadRequest,
    web,
    Error,
};
use chrono::{Duration, Utc};
use eats_partner_engine::helpers::verify_signature;
use epg_common::Secret;
use futures::future::LocalBoxFuture;
use log::{trace, warn};

use crate::errors::ServerError;

pub const SIGNATURE_HEADER: &str = "X-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Timestamp";

pub struct SignatureMiddlewareFactory {
    secret: Secret<String>,
    max_skew: Duration,
    // If false, then the middleware will not check the signature and always allow the call
    enabled: bool,
}

impl SignatureMiddlewareFactory {
    pub fn new(secret: Secret<String>, max_skew: Duration, enabled: bool) -> Self {
        SignatureMiddlewareFactory { secret, max_skew, enabled }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SignatureMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = SignatureMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SignatureMiddlewareService {
            secret: self.secret.clone(),
            max_skew: self.max_skew,
            enabled: self.enabled,
            service: Rc::new(service),
        }))
    }
}

pub struct SignatureMiddlewareService<S> {
    secret: Secret<String>,
    max_skew: Duration,
    enabled: bool,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for SignatureMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let secret = self.secret.reveal().clone();
        let max_skew = self.max_skew;
        let enabled = self.enabled;
        Box::pin(async move {
            trace!("🔐️ Checking webhook signature for request");
            if !enabled {
                trace!("🔐️ Signature checks are disabled. Allowing request.");
                return service.call(req).await;
            }
            let signature = match header_value(&req, SIGNATURE_HEADER) {
                Some(sig) => sig,
                None => {
                    warn!("🔐️ No webhook signature found in request. Denying access.");
                    return Err(ServerError::SignatureVerificationFailed.into());
                },
            };
            let timestamp = match header_value(&req, TIMESTAMP_HEADER).and_then(|v| v.parse::<i64>().ok()) {
                Some(ts) => ts,
                None => {
                    warn!("🔐️ Missing or malformed webhook timestamp header. Denying access.");
                    return Err(ServerError::SignatureVerificationFailed.into());
                },
            };
            let data = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Failed to extract request data: {:?}", e);
                ErrorBadRequest("Failed to extract request data.")
            })?;
            let validated = verify_signature(data.as_ref(), &signature, timestamp, &secret, max_skew, Utc::now());
            if validated {
                trace!("🔐️ Webhook signature check ✅️");
                req.set_payload(bytes_to_payload(data));
                service.call(req).await
            } else {
                warn!("🔐️ Invalid or stale webhook signature. Denying access.");
                Err(ServerError::SignatureVerificationFailed.into())
            }
        })
    }
}

fn header_value(req: &ServiceRequest, name: &str) -> Option<String> {
    req.headers().get(name).and_then(|v| v.to_str().ok()).map(|s| s.to_string())
}

fn bytes_to_payload(buf: web::Bytes) -> Payload {
    let (_, mut pl) = h1::Payload::create(true);
    pl.unread_data(buf);
    Payload::from(pl)
}
