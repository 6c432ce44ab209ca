//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause
//! the current worker to stop processing new requests. For this reason, any long, non-cpu-bound operation (e.g. I/O,
//! database operations, etc.) should be expressed as futures or asynchronous functions. Async handlers get executed
//! concurrently by worker threads and thus don't block execution.

use actix_web::{get, web, HttpResponse, Responder};
use eats_partner_engine::{
    db_types::OrderId,
    dispatch::DispatchHandle,
    traits::{EventQueryFilter, GatewayDatabase, PartnerGateway, TokenExchange},
    EventFlowApi,
    TokenApi,
};
use log::*;

use crate::{
    data_objects::{IntrospectParams, JsonResponse, RetryParams, SubjectParams},
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal requires key) => {
        paste::paste! { pub struct [<$name:camel Route>];}
        paste::paste! {
                impl [<$name:camel Route>] {
                #[allow(clippy::new_without_default)]
                pub fn new() -> Self { Self }
            }
        }
        paste::paste! {
            impl actix_web::dev::HttpServiceFactory for [<$name:camel Route>] {
                fn register(self, config: &mut actix_web::dev::AppService) {
                    let res = actix_web::Resource::new($path)
                        .name(stringify!($name))
                        .guard(actix_web::guard::$method())
                        .to($name)
                        .wrap($crate::middleware::ApiKeyMiddlewareFactory::new());
                    actix_web::dev::HttpServiceFactory::register(res, config);
                }
            }
        }
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+ where requires key)  => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>)
                    .wrap($crate::middleware::ApiKeyMiddlewareFactory::new());
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

// -------------------------------------------  Event inspection  ------------------------------------------------

route!(list_events => Get "/events" impl GatewayDatabase, PartnerGateway where requires key);
/// Lists stored webhook events, newest first, filtered by status/type/order and paginated.
pub async fn list_events<B, G>(
    query: web::Query<EventQueryFilter>,
    api: web::Data<EventFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: GatewayDatabase,
    G: PartnerGateway,
{
    let events = api.search_events(query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(events))
}

route!(get_event => Get "/events/{id}" impl GatewayDatabase, PartnerGateway where requires key);
pub async fn get_event<B, G>(
    path: web::Path<i64>,
    api: web::Data<EventFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: GatewayDatabase,
    G: PartnerGateway,
{
    let id = path.into_inner();
    let event = api.fetch_event(id).await?.ok_or_else(|| ServerError::NoRecordFound(format!("Event #{id}")))?;
    Ok(HttpResponse::Ok().json(event))
}

route!(order_event_trail => Get "/orders/{order_id}/events" impl GatewayDatabase, PartnerGateway where requires key);
/// The full webhook audit trail for an order, oldest first.
pub async fn order_event_trail<B, G>(
    path: web::Path<String>,
    api: web::Data<EventFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: GatewayDatabase,
    G: PartnerGateway,
{
    let order_id = OrderId::from(path.into_inner());
    let events = api.events_for_order(&order_id).await?;
    Ok(HttpResponse::Ok().json(events))
}

// -------------------------------------------  Manual retry  ----------------------------------------------------

route!(retry_event => Post "/events/{id}/retry" impl GatewayDatabase, PartnerGateway where requires key);
/// Re-arms a failed or retrying event and puts it straight back on the dispatch queue. Attempt counters are
/// preserved unless `reset_attempts` is set.
pub async fn retry_event<B, G>(
    path: web::Path<i64>,
    params: Option<web::Json<RetryParams>>,
    api: web::Data<EventFlowApi<B, G>>,
    dispatch: web::Data<DispatchHandle>,
) -> Result<HttpResponse, ServerError>
where
    B: GatewayDatabase,
    G: PartnerGateway,
{
    let id = path.into_inner();
    let reset_attempts = params.map(|p| p.reset_attempts).unwrap_or_default();
    let event = api.manual_retry(id, reset_attempts).await?;
    dispatch.submit(event.id).await;
    info!("💻️ Operator re-armed event [{}] (reset_attempts={reset_attempts})", event.event_id);
    Ok(HttpResponse::Ok().json(event))
}

route!(cancel_event_retry => Post "/events/{id}/cancel_retry" impl GatewayDatabase, PartnerGateway where requires key);
/// Removes an event's scheduled retry. The event is marked failed and stays available for manual retry.
pub async fn cancel_event_retry<B, G>(
    path: web::Path<i64>,
    api: web::Data<EventFlowApi<B, G>>,
    dispatch: web::Data<DispatchHandle>,
) -> Result<HttpResponse, ServerError>
where
    B: GatewayDatabase,
    G: PartnerGateway,
{
    let id = path.into_inner();
    let event = api.cancel_retry(id).await?;
    dispatch.cancel_retry(event.id).await;
    Ok(HttpResponse::Ok().json(event))
}

// -------------------------------------------  Token management  ------------------------------------------------

route!(refresh_partner_token => Post "/auth/refresh" impl GatewayDatabase, TokenExchange where requires key);
/// Forces a refresh-token exchange for the subject. Fails with 502 when re-authentication is required.
pub async fn refresh_partner_token<B, X>(
    params: web::Json<SubjectParams>,
    tokens: web::Data<TokenApi<B, X>>,
) -> Result<HttpResponse, ServerError>
where
    B: GatewayDatabase,
    X: TokenExchange,
{
    let token = tokens.refresh(&params.subject).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Token refreshed. Expires {}", token.expires_at))))
}

route!(revoke_partner_token => Post "/auth/revoke" impl GatewayDatabase, TokenExchange where requires key);
pub async fn revoke_partner_token<B, X>(
    params: web::Json<SubjectParams>,
    tokens: web::Data<TokenApi<B, X>>,
) -> Result<HttpResponse, ServerError>
where
    B: GatewayDatabase,
    X: TokenExchange,
{
    tokens.revoke(&params.subject).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success("Token revoked")))
}

route!(introspect_partner_token => Get "/auth/introspect" impl GatewayDatabase, TokenExchange where requires key);
pub async fn introspect_partner_token<B, X>(
    params: web::Query<IntrospectParams>,
    tokens: web::Data<TokenApi<B, X>>,
) -> Result<HttpResponse, ServerError>
where
    B: GatewayDatabase,
    X: TokenExchange,
{
    let result = tokens.introspect(&params.token).await?;
    Ok(HttpResponse::Ok().json(result))
}
