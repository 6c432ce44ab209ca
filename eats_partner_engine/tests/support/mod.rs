//! Shared scaffolding for the engine integration tests: scratch databases and canned outbound collaborators.
#![allow(dead_code)]

use std::{
    path::Path,
    sync::{
        atomic::{AtomicI64, AtomicUsize, Ordering},
        Arc,
    },
};

use eats_partner_engine::{
    db_types::{CancelReason, OrderId},
    helpers::calculate_signature,
    traits::{GatewayError, PartnerGateway, TokenExchange, TokenGrant},
    SqliteDatabase,
};
use log::*;
use sqlx::{migrate, migrate::MigrateDatabase, Sqlite};

pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
    create_database(url).await;
    run_migrations(url).await;
}

pub fn random_db_path() -> String {
    format!("sqlite://../data/test_store_{}", rand::random::<u64>())
}

pub async fn run_migrations(url: &str) {
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating connection to database");
    migrate!("./src/sqlite/db/migrations").run(db.pool()).await.expect("Error running DB migrations");
    info!("🚀️ Migrations complete");
}

pub async fn create_database<P: AsRef<Path>>(path: P) {
    let p = path.as_ref().as_os_str().to_str().unwrap();
    if let Err(e) = Sqlite::drop_database(p).await {
        warn!("Error dropping database {p}: {e:?}");
    }
    Sqlite::create_database(p).await.expect("Error creating database");
    info!("Created Sqlite database {p}");
}

/// Builds a signed webhook envelope body for the given metadata and data block.
#[allow(dead_code)]
pub fn envelope(event_id: &str, event_type: &str, data: serde_json::Value) -> String {
    serde_json::json!({
        "metadata": {
            "event_id": event_id,
            "event_type": event_type,
            "event_time": chrono::Utc::now(),
        },
        "data": data,
    })
    .to_string()
}

#[allow(dead_code)]
pub fn signed_headers(secret: &str, body: &str) -> (String, i64) {
    let ts = chrono::Utc::now().timestamp();
    (calculate_signature(secret, ts, body.as_bytes()), ts)
}

//--------------------------------------  Outbound collaborators  -----------------------------------------------------

/// Counts exchanges so tests can assert the single-flight property.
#[derive(Clone, Default)]
pub struct CountingExchange {
    pub exchanges: Arc<AtomicUsize>,
    pub refreshes: Arc<AtomicUsize>,
    pub revokes: Arc<AtomicUsize>,
    /// When set, every exchange fails this way.
    pub reject_status: Option<u16>,
    pub always_transient: bool,
}

impl TokenExchange for CountingExchange {
    async fn exchange(&self, subject: &str, scopes: &str) -> Result<TokenGrant, GatewayError> {
        // Hold the exchange open briefly so concurrent acquires genuinely overlap.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let n = self.exchanges.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(status) = self.reject_status {
            return Err(GatewayError::Rejected { status, message: "invalid_client".to_string() });
        }
        if self.always_transient {
            return Err(GatewayError::Transient("connection reset by peer".to_string()));
        }
        Ok(TokenGrant {
            access_token: format!("at-{subject}-{n}"),
            refresh_token: Some(format!("rt-{subject}-{n}")),
            expires_in: 3600,
            scope: scopes.to_string(),
        })
    }

    async fn refresh(&self, subject: &str, _refresh_token: &str) -> Result<TokenGrant, GatewayError> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(status) = self.reject_status {
            return Err(GatewayError::Rejected { status, message: "invalid_grant".to_string() });
        }
        Ok(TokenGrant {
            access_token: format!("at-{subject}-refreshed-{n}"),
            refresh_token: Some(format!("rt-{subject}-refreshed-{n}")),
            expires_in: 3600,
            scope: String::new(),
        })
    }

    async fn revoke(&self, _access_token: &str) -> Result<(), GatewayError> {
        self.revokes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A partner gateway that records notifications and can be told to fail `notify_ready` transiently a set number of
/// times before succeeding.
#[derive(Clone, Default)]
pub struct RecordingGateway {
    pub accepts: Arc<AtomicUsize>,
    pub denies: Arc<AtomicUsize>,
    pub readies: Arc<AtomicUsize>,
    pub cancels: Arc<AtomicUsize>,
    pub ready_failures_remaining: Arc<AtomicI64>,
}

impl RecordingGateway {
    #[allow(dead_code)]
    pub fn failing_ready(times: i64) -> Self {
        let gw = Self::default();
        gw.ready_failures_remaining.store(times, Ordering::SeqCst);
        gw
    }
}

impl PartnerGateway for RecordingGateway {
    async fn notify_accept(&self, _order_id: &OrderId, _eta_minutes: i64) -> Result<(), GatewayError> {
        self.accepts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn notify_deny(&self, _order_id: &OrderId, _reason: CancelReason) -> Result<(), GatewayError> {
        self.denies.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn notify_ready(&self, _order_id: &OrderId) -> Result<(), GatewayError> {
        if self.ready_failures_remaining.fetch_sub(1, Ordering::SeqCst) > 0 {
            return Err(GatewayError::Transient("partner 503".to_string()));
        }
        self.readies.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn notify_cancel(&self, _order_id: &OrderId, _reason: CancelReason) -> Result<(), GatewayError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
