//! Operator API key middleware.
//!
//! The operator surface (event inspection, manual retries, order actions) is guarded by a single static key carried
//! in the `X-Api-Key` header. The expected key lives in app data ([`ApiKeyState`]) so the same middleware instance
//! can be attached per-route via the `route!` macro.

use std::{pin::Pin, rc::Rc};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorInternalServerError,
    web,
    Error,
};
use epg_common::Secret;
use futures::{
    future::{ok, Ready},
    Future,
};
use log::warn;

use crate::errors::ServerError;

pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Holds the expected operator key. Registered once as app data.
#[derive(Clone)]
pub struct ApiKeyState {
    key: Secret<String>,
}

impl ApiKeyState {
    pub fn new(key: Secret<String>) -> Self {
        Self { key }
    }

    pub fn matches(&self, provided: &str) -> bool {
        constant_time_eq(self.key.reveal().as_bytes(), provided.as_bytes())
    }
}

/// Byte-fold comparison that does not short-circuit on the first mismatch.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub struct ApiKeyMiddlewareFactory;

impl ApiKeyMiddlewareFactory {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        ApiKeyMiddlewareFactory
    }
}

impl<S, B> Transform<S, ServiceRequest> for ApiKeyMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = ApiKeyMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(ApiKeyMiddlewareService { service: Rc::new(service) })
    }
}

pub struct ApiKeyMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for ApiKeyMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        Box::pin(async move {
            let state = req
                .app_data::<web::Data<ApiKeyState>>()
                .ok_or_else(|| {
                    warn!("No API key state found in app data");
                    ErrorInternalServerError("No API key state found in app data")
                })?
                .clone();
            let provided = req.headers().get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
            match provided {
                Some(key) if state.matches(key) => service.call(req).await,
                Some(_) => {
                    warn!("🔐️ Operator call with an invalid API key was rejected");
                    Err(ServerError::InvalidApiKey.into())
                },
                None => {
                    warn!("🔐️ Operator call without an API key was rejected");
                    Err(ServerError::InvalidApiKey.into())
                },
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn key_comparison_requires_exact_match() {
        let state = ApiKeyState::new(Secret::new("sk-operator-1".to_string()));
        assert!(state.matches("sk-operator-1"));
        assert!(!state.matches("sk-operator-2"));
        assert!(!state.matches("sk-operator-1 "));
        assert!(!state.matches(""));
    }
}
