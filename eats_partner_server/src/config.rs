use std::env;

use chrono::Duration;
use eats_tools::EatsConfig;
use epg_common::{helpers::parse_boolean_flag, Secret};
use log::*;
use rand::{distributions::Alphanumeric, Rng};

const DEFAULT_EPG_HOST: &str = "127.0.0.1";
const DEFAULT_EPG_PORT: u16 = 8360;
/// Webhook timestamps further than this from the server clock are rejected as replays.
const DEFAULT_MAX_SKEW: Duration = Duration::minutes(5);
/// The partner gives merchants 11.5 minutes to accept or deny before it gives up on the order.
const DEFAULT_ACCEPTANCE_WINDOW: Duration = Duration::seconds(690);
const DEFAULT_DISPATCH_WORKERS: usize = 8;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Shared secret the partner signs webhook bodies with.
    pub webhook_secret: Secret<String>,
    /// If false, webhook signature checks are skipped entirely. Never disable this in production.
    pub signature_checks: bool,
    pub max_skew: Duration,
    /// How long a Pending order may wait for an accept/deny decision before it is auto-failed.
    pub acceptance_window: Duration,
    /// Size of the event dispatch worker pool.
    pub dispatch_workers: usize,
    /// Static key for the operator API.
    pub api_key: Secret<String>,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_forwarded: bool,
    /// The subject and scope set the gateway mints partner tokens under.
    pub eats_subject: String,
    pub eats_scopes: String,
    /// Partner REST/OAuth client configuration.
    pub eats: EatsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_EPG_HOST.to_string(),
            port: DEFAULT_EPG_PORT,
            database_url: String::default(),
            webhook_secret: Secret::default(),
            signature_checks: true,
            max_skew: DEFAULT_MAX_SKEW,
            acceptance_window: DEFAULT_ACCEPTANCE_WINDOW,
            dispatch_workers: DEFAULT_DISPATCH_WORKERS,
            api_key: Secret::default(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            eats_subject: "gateway".to_string(),
            eats_scopes: "eats.order eats.store".to_string(),
            eats: EatsConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("EPG_HOST").ok().unwrap_or_else(|| DEFAULT_EPG_HOST.into());
        let port = env::var("EPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for EPG_PORT. {e} Using the default, {DEFAULT_EPG_PORT}, instead."
                    );
                    DEFAULT_EPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_EPG_PORT);
        let database_url = env::var("EPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ EPG_DATABASE_URL is not set. Please set it to the URL for the gateway database.");
            String::default()
        });
        let webhook_secret = Secret::new(env::var("EPG_WEBHOOK_SECRET").unwrap_or_else(|_| {
            error!("🪛️ EPG_WEBHOOK_SECRET is not set. Incoming webhooks will not verify until it is configured.");
            String::default()
        }));
        let signature_checks = parse_boolean_flag(env::var("EPG_SIGNATURE_CHECKS").ok(), true);
        if !signature_checks {
            warn!("🚨️ Webhook signature checks are DISABLED. Do not run like this in production.");
        }
        let max_skew = duration_from_env("EPG_MAX_SKEW_SECS", DEFAULT_MAX_SKEW);
        let acceptance_window = duration_from_env("EPG_ACCEPTANCE_WINDOW_SECS", DEFAULT_ACCEPTANCE_WINDOW);
        let dispatch_workers = env::var("EPG_DISPATCH_WORKERS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_DISPATCH_WORKERS);
        let api_key = match env::var("EPG_API_KEY") {
            Ok(key) => Secret::new(key),
            Err(_) => {
                let key: String = rand::thread_rng().sample_iter(&Alphanumeric).take(32).map(char::from).collect();
                warn!(
                    "🚨️ EPG_API_KEY is not set. Using the random key '{key}' for this session. Operator calls made \
                     without it will be rejected."
                );
                Secret::new(key)
            },
        };
        let use_x_forwarded_for = parse_boolean_flag(env::var("EPG_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("EPG_USE_FORWARDED").ok(), false);
        let eats_subject = env::var("EPG_EATS_SUBJECT").ok().unwrap_or_else(|| "gateway".to_string());
        let eats_scopes = env::var("EPG_EATS_SCOPES").ok().unwrap_or_else(|| "eats.order eats.store".to_string());
        let eats = EatsConfig::new_from_env_or_default();
        Self {
            host,
            port,
            database_url,
            webhook_secret,
            signature_checks,
            max_skew,
            acceptance_window,
            dispatch_workers,
            api_key,
            use_x_forwarded_for,
            use_forwarded,
            eats_subject,
            eats_scopes,
            eats,
        }
    }
}

fn duration_from_env(name: &str, default: Duration) -> Duration {
    env::var(name)
        .map_err(|_| {
            info!("🪛️ {name} is not set. Using the default value of {} seconds.", default.num_seconds());
        })
        .and_then(|s| {
            s.parse::<i64>()
                .map(Duration::seconds)
                .map_err(|e| warn!("🪛️ Invalid configuration value for {name}. {e}"))
        })
        .ok()
        .unwrap_or(default)
}
