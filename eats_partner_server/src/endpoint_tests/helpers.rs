use eats_partner_engine::SqliteDatabase;
use log::*;
use sqlx::{migrate, migrate::MigrateDatabase, Sqlite};

pub const TEST_WEBHOOK_SECRET: &str = "test_webhook_secret";
pub const TEST_API_KEY: &str = "test_operator_key";

/// Creates a fresh, migrated scratch database for an endpoint test.
pub async fn scratch_db() -> SqliteDatabase {
    let _ = env_logger::try_init();
    let url = format!("sqlite://../data/test_server_{}", rand::random::<u64>());
    if let Err(e) = Sqlite::drop_database(&url).await {
        warn!("Error dropping database {url}: {e:?}");
    }
    Sqlite::create_database(&url).await.expect("Error creating database");
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
    migrate!("../eats_partner_engine/src/sqlite/db/migrations")
        .run(db.pool())
        .await
        .expect("Error running DB migrations");
    db
}

/// Builds the signed webhook envelope body plus matching signature headers.
pub fn signed_envelope(event_id: &str, event_type: &str, data: serde_json::Value) -> (String, String, String) {
    let body = serde_json::json!({
        "metadata": {
            "event_id": event_id,
            "event_type": event_type,
            "event_time": chrono::Utc::now(),
        },
        "data": data,
    })
    .to_string();
    let ts = chrono::Utc::now().timestamp();
    let sig = eats_partner_engine::helpers::calculate_signature(TEST_WEBHOOK_SECRET, ts, body.as_bytes());
    (body, sig, ts.to_string())
}

/// Builds an actix `App` wired the way `create_server_instance` does it, but against a scratch database and the
/// canned outbound stubs. Kept as a macro because the concrete `App` type cannot be named.
#[macro_export]
macro_rules! test_app {
    ($db:expr, $gateway:expr) => {{
        use actix_web::{web, App};
        use chrono::Duration;
        use eats_partner_engine::{dispatch::dispatch_channel, events::EventProducers, EventFlowApi, TokenApi};
        use epg_common::Secret;

        use $crate::{
            endpoint_tests::{
                helpers::{TEST_API_KEY, TEST_WEBHOOK_SECRET},
                mocks::{StubExchange, StubGateway},
            },
            middleware::{ApiKeyState, SignatureMiddlewareFactory},
            order_routes::{
                AcceptOrderRoute,
                CancelOrderRoute,
                DenyOrderRoute,
                GetOrderRoute,
                MarkReadyRoute,
                ResolveIssueRoute,
                StartPreparingRoute,
            },
            routes::{
                health,
                CancelEventRetryRoute,
                GetEventRoute,
                ListEventsRoute,
                OrderEventTrailRoute,
                RetryEventRoute,
            },
            server::ProxyOptions,
            webhook_routes::IncomingWebhookRoute,
        };

        type Db = eats_partner_engine::SqliteDatabase;
        let db: Db = $db;
        let gateway: StubGateway = $gateway;
        let event_api = EventFlowApi::new(db.clone(), gateway.clone(), EventProducers::default());
        let token_api = TokenApi::new(db, StubExchange::default());
        // The receiver rides along in the return value so dispatch submissions do not error out mid-test
        let (dispatch, rx) = dispatch_channel();
        let app = App::new()
            .app_data(web::Data::new(event_api))
            .app_data(web::Data::new(token_api))
            .app_data(web::Data::new(gateway))
            .app_data(web::Data::new(dispatch))
            .app_data(web::Data::new(ApiKeyState::new(Secret::new(TEST_API_KEY.to_string()))))
            .app_data(web::Data::new(ProxyOptions { use_x_forwarded_for: false, use_forwarded: false }));
        let api_scope = web::scope("/api")
            .service(ListEventsRoute::<Db, StubGateway>::new())
            .service(GetEventRoute::<Db, StubGateway>::new())
            .service(OrderEventTrailRoute::<Db, StubGateway>::new())
            .service(RetryEventRoute::<Db, StubGateway>::new())
            .service(CancelEventRetryRoute::<Db, StubGateway>::new())
            .service(GetOrderRoute::<Db, StubGateway>::new())
            .service(AcceptOrderRoute::<Db, StubGateway>::new())
            .service(DenyOrderRoute::<Db, StubGateway>::new())
            .service(CancelOrderRoute::<Db, StubGateway>::new())
            .service(StartPreparingRoute::<Db, StubGateway>::new())
            .service(MarkReadyRoute::<Db, StubGateway>::new())
            .service(ResolveIssueRoute::<Db, StubGateway>::new());
        let webhook_scope = web::scope("/webhook")
            .wrap(SignatureMiddlewareFactory::new(
                Secret::new(TEST_WEBHOOK_SECRET.to_string()),
                Duration::minutes(5),
                true,
            ))
            .service(IncomingWebhookRoute::<Db, StubGateway>::new());
        (app.service(health).service(api_scope).service(webhook_scope), rx)
    }};
}
