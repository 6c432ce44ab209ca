use epg_common::Secret;
use log::*;

#[derive(Debug, Clone)]
pub struct EatsConfig {
    /// Base URL for the partner REST API, e.g. "https://api.partner.example.com"
    pub base_url: String,
    /// Token endpoint for the OAuth client-credentials flow. The revocation and introspection endpoints are derived
    /// from this URL by replacing the trailing `/token` path segment.
    pub auth_url: String,
    pub client_id: String,
    pub client_secret: Secret<String>,
    /// Timeout applied to every outbound request.
    pub request_timeout_secs: u64,
}

impl Default for EatsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.partner.example.com".to_string(),
            auth_url: "https://auth.partner.example.com/oauth/v2/token".to_string(),
            client_id: String::default(),
            client_secret: Secret::default(),
            request_timeout_secs: 10,
        }
    }
}

impl EatsConfig {
    pub fn new_from_env_or_default() -> Self {
        let defaults = EatsConfig::default();
        let base_url = std::env::var("EPG_EATS_BASE_URL").unwrap_or_else(|_| {
            warn!("EPG_EATS_BASE_URL not set, using {}", defaults.base_url);
            defaults.base_url
        });
        let auth_url = std::env::var("EPG_EATS_AUTH_URL").unwrap_or_else(|_| {
            warn!("EPG_EATS_AUTH_URL not set, using {}", defaults.auth_url);
            defaults.auth_url
        });
        let client_id = std::env::var("EPG_EATS_CLIENT_ID").unwrap_or_else(|_| {
            warn!("EPG_EATS_CLIENT_ID not set. Outbound partner calls will be rejected.");
            String::default()
        });
        let client_secret = Secret::new(std::env::var("EPG_EATS_CLIENT_SECRET").unwrap_or_else(|_| {
            warn!("EPG_EATS_CLIENT_SECRET not set. Outbound partner calls will be rejected.");
            String::default()
        }));
        let request_timeout_secs = std::env::var("EPG_EATS_REQUEST_TIMEOUT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.request_timeout_secs);
        Self { base_url, auth_url, client_id, client_secret, request_timeout_secs }
    }

    pub fn revoke_url(&self) -> String {
        self.auth_url.replace("/token", "/revoke")
    }

    pub fn introspect_url(&self) -> String {
        self.auth_url.replace("/token", "/introspect")
    }
}
