use std::{future::Future, pin::Pin, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use eats_partner_engine::{
    db_types::EventStatus,
    dispatch::{dispatch_channel, run_dispatcher, DispatchHandle},
    events::{EventHandlers, EventHooks},
    EventFlowApi,
    SqliteDatabase,
    TokenApi,
};
use eats_tools::EatsApi;
use log::*;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    integrations::eats::{EatsExchange, EatsGateway},
    middleware::{ApiKeyState, SignatureMiddlewareFactory},
    order_routes::{
        AcceptOrderRoute,
        CancelOrderRoute,
        CreateDeliveryRoute,
        DenyOrderRoute,
        GetOrderRoute,
        MarkReadyRoute,
        QuoteDeliveryRoute,
        ResolveIssueRoute,
        StartPreparingRoute,
    },
    routes::{
        health,
        CancelEventRetryRoute,
        GetEventRoute,
        IntrospectPartnerTokenRoute,
        ListEventsRoute,
        OrderEventTrailRoute,
        RefreshPartnerTokenRoute,
        RetryEventRoute,
        RevokePartnerTokenRoute,
    },
    timeout_worker::start_timeout_worker,
    webhook_routes::IncomingWebhookRoute,
};

type Db = SqliteDatabase;
type Gateway = EatsGateway<Db>;

/// Header-derived client addressing options, shared with handlers via app data.
#[derive(Clone, Copy, Debug)]
pub struct ProxyOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
}

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;

    // Permanent event failures are surfaced to operators; for now that means a loud log line.
    let mut hooks = EventHooks::default();
    hooks.on_event_failed(|failure| {
        Box::pin(async move {
            error!(
                "🚨️ Event [{}] ({}) has failed permanently and needs operator attention. {}",
                failure.event.event_id, failure.event.event_type, failure.reason
            );
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let handlers = EventHandlers::new(32, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let eats_api = EatsApi::new(config.eats.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let exchange = EatsExchange::new(eats_api.clone());
    let token_api = TokenApi::new(db.clone(), exchange);
    let gateway = EatsGateway::new(eats_api, token_api.clone(), &config.eats_subject, &config.eats_scopes);
    let event_api = EventFlowApi::new(db, gateway.clone(), producers);

    let (dispatch, rx) = dispatch_channel();
    tokio::spawn(run_dispatcher(event_api.clone(), rx, config.dispatch_workers));
    requeue_incomplete_events(&event_api, &dispatch).await;
    start_timeout_worker(event_api.orders().clone(), config.acceptance_window);

    let srv = create_server_instance(config, event_api, token_api, gateway, dispatch)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// Events that were mid-pipeline when the process last stopped are put back on the queue, honouring any retry
/// schedule they already had.
async fn requeue_incomplete_events(api: &EventFlowApi<Db, Gateway>, dispatch: &DispatchHandle) {
    match api.recover_incomplete_events().await {
        Ok(events) => {
            if !events.is_empty() {
                info!("🚚️ Re-queueing {} incomplete event(s) from the previous run", events.len());
            }
            for event in events {
                match (event.status, event.next_attempt_at) {
                    (EventStatus::Retrying, Some(at)) => dispatch.schedule(event.id, at).await,
                    _ => dispatch.submit(event.id).await,
                }
            }
        },
        Err(e) => error!("🚚️ Could not recover incomplete events: {e}"),
    }
}

pub fn create_server_instance(
    config: ServerConfig,
    event_api: EventFlowApi<Db, Gateway>,
    token_api: TokenApi<Db, EatsExchange>,
    gateway: Gateway,
    dispatch: DispatchHandle,
) -> Result<Server, ServerError> {
    let srv = HttpServer::new(move || {
        let proxy_options =
            ProxyOptions { use_x_forwarded_for: config.use_x_forwarded_for, use_forwarded: config.use_forwarded };
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("epg::access_log"))
            .app_data(web::Data::new(event_api.clone()))
            .app_data(web::Data::new(token_api.clone()))
            .app_data(web::Data::new(gateway.clone()))
            .app_data(web::Data::new(dispatch.clone()))
            .app_data(web::Data::new(ApiKeyState::new(config.api_key.clone())))
            .app_data(web::Data::new(proxy_options));
        // Operator routes, guarded per-route by the API key middleware
        let api_scope = web::scope("/api")
            .service(ListEventsRoute::<Db, Gateway>::new())
            .service(GetEventRoute::<Db, Gateway>::new())
            .service(OrderEventTrailRoute::<Db, Gateway>::new())
            .service(RetryEventRoute::<Db, Gateway>::new())
            .service(CancelEventRetryRoute::<Db, Gateway>::new())
            .service(GetOrderRoute::<Db, Gateway>::new())
            .service(AcceptOrderRoute::<Db, Gateway>::new())
            .service(DenyOrderRoute::<Db, Gateway>::new())
            .service(CancelOrderRoute::<Db, Gateway>::new())
            .service(StartPreparingRoute::<Db, Gateway>::new())
            .service(MarkReadyRoute::<Db, Gateway>::new())
            .service(ResolveIssueRoute::<Db, Gateway>::new())
            .service(QuoteDeliveryRoute::<Gateway>::new())
            .service(CreateDeliveryRoute::<Gateway>::new())
            .service(RefreshPartnerTokenRoute::<Db, EatsExchange>::new())
            .service(RevokePartnerTokenRoute::<Db, EatsExchange>::new())
            .service(IntrospectPartnerTokenRoute::<Db, EatsExchange>::new());
        // The webhook intake, wrapped with signature verification
        let webhook_scope = web::scope("/webhook")
            .wrap(SignatureMiddlewareFactory::new(
                config.webhook_secret.clone(),
                config.max_skew,
                config.signature_checks,
            ))
            .service(IncomingWebhookRoute::<Db, Gateway>::new());
        app.service(health).service(api_scope).service(webhook_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
