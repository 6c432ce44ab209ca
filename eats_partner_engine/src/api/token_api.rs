use std::{fmt::Debug, sync::Arc, time::Duration as StdDuration};

use chrono::{DateTime, Duration, Utc};
use log::*;
use serde::Serialize;

use crate::{
    api::{errors::TokenError, KeyedLock},
    db_types::{AuthToken, NewAuthToken},
    traits::{GatewayError, TokenExchange, TokenGrant, TokenStore},
};

/// Tokens expiring within this margin are treated as already expired, so a token can never go stale between
/// `acquire` returning and the outbound call using it.
const DEFAULT_EXPIRY_MARGIN: Duration = Duration::seconds(60);
/// In-process retry schedule for transient exchange failures.
const EXCHANGE_RETRY_ATTEMPTS: u32 = 3;
const EXCHANGE_RETRY_BASE: StdDuration = StdDuration::from_millis(500);

/// Normalises a scope string into its canonical form: whitespace-split, deduplicated, sorted, space-joined.
/// The canonical form keys the credential cache and the single-flight registry, so "eats.order eats.store" and
/// "eats.store  eats.order" share a token.
pub fn canonical_scopes(raw: &str) -> String {
    let mut scopes: Vec<&str> = raw.split_whitespace().collect();
    scopes.sort_unstable();
    scopes.dedup();
    scopes.join(" ")
}

/// Read-only view of a token's validity.
#[derive(Debug, Clone, Serialize)]
pub struct TokenIntrospection {
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Option<String>,
}

/// The OAuth token lifecycle manager.
///
/// Owns all credential state. Concurrent `acquire` calls for the same (subject, scope set) during a cache miss share
/// a single in-flight exchange: the per-key lock admits one caller to the exchange, and everyone who waited re-reads
/// the store and finds the fresh token.
pub struct TokenApi<B, X> {
    db: B,
    exchanger: X,
    flights: Arc<KeyedLock<String>>,
    expiry_margin: Duration,
    retry_attempts: u32,
    retry_base: StdDuration,
}

impl<B, X> Debug for TokenApi<B, X> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TokenApi")
    }
}

impl<B: Clone, X: Clone> Clone for TokenApi<B, X> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            exchanger: self.exchanger.clone(),
            flights: Arc::clone(&self.flights),
            expiry_margin: self.expiry_margin,
            retry_attempts: self.retry_attempts,
            retry_base: self.retry_base,
        }
    }
}

impl<B, X> TokenApi<B, X> {
    pub fn new(db: B, exchanger: X) -> Self {
        Self {
            db,
            exchanger,
            flights: Arc::new(KeyedLock::new()),
            expiry_margin: DEFAULT_EXPIRY_MARGIN,
            retry_attempts: EXCHANGE_RETRY_ATTEMPTS,
            retry_base: EXCHANGE_RETRY_BASE,
        }
    }

    /// Overrides the expiry safety margin. Mostly useful in tests.
    pub fn with_expiry_margin(mut self, margin: Duration) -> Self {
        self.expiry_margin = margin;
        self
    }

    pub fn with_retry_schedule(mut self, attempts: u32, base: StdDuration) -> Self {
        self.retry_attempts = attempts;
        self.retry_base = base;
        self
    }
}

impl<B, X> TokenApi<B, X>
where
    B: TokenStore,
    X: TokenExchange,
{
    /// Returns a currently valid token for the subject and scope set, performing a client-credentials exchange if
    /// the cached one is missing or expires within the safety margin.
    pub async fn acquire(&self, subject: &str, scopes: &str) -> Result<AuthToken, TokenError> {
        let scopes = canonical_scopes(scopes);
        if let Some(token) = self.fresh_token(subject, &scopes).await? {
            return Ok(token);
        }
        let flight_key = format!("{subject}\u{1f}{scopes}");
        let _flight = self.flights.acquire(&flight_key).await;
        // Whoever held the lock before us has already exchanged and stored; check again before going to the partner.
        if let Some(token) = self.fresh_token(subject, &scopes).await? {
            trace!("🔑️ Token for {subject} [{scopes}] was refreshed by a concurrent caller");
            return Ok(token);
        }
        debug!("🔑️ No valid token for {subject} [{scopes}]. Performing a token exchange.");
        let grant = self.exchange_with_retry(subject, &scopes).await?;
        let token = self.store_grant(subject, &scopes, grant).await?;
        info!("🔑️ New token issued for {subject} [{scopes}], expires {}", token.expires_at);
        Ok(token)
    }

    /// Exchanges the stored refresh token for a new access token. Fails with `ReauthRequired` when no refresh token
    /// is on record or the partner rejects it; that failure is surfaced, never retried internally.
    pub async fn refresh(&self, subject: &str) -> Result<AuthToken, TokenError> {
        let current = self
            .db
            .fetch_latest_token_for_subject(subject)
            .await?
            .ok_or_else(|| TokenError::ReauthRequired(format!("No token on record for {subject}")))?;
        let refresh_token = current
            .refresh_token
            .clone()
            .ok_or_else(|| TokenError::ReauthRequired(format!("No refresh token on record for {subject}")))?;
        let scopes = current.scopes.clone();
        let flight_key = format!("{subject}\u{1f}{scopes}");
        let _flight = self.flights.acquire(&flight_key).await;
        let grant = match self.exchanger.refresh(subject, &refresh_token).await {
            Ok(grant) => grant,
            Err(GatewayError::Rejected { status, message }) => {
                warn!("🔑️ Partner rejected the refresh token for {subject} ({status}). Re-authentication required.");
                return Err(TokenError::ReauthRequired(message));
            },
            Err(GatewayError::Transient(e)) => return Err(TokenError::Transient(e)),
        };
        let token = self.store_grant(subject, &scopes, grant).await?;
        info!("🔑️ Token for {subject} [{scopes}] refreshed, expires {}", token.expires_at);
        Ok(token)
    }

    /// Marks the subject's tokens revoked and makes a best-effort revocation call to the partner. Revoking a subject
    /// with nothing on record is a no-op success.
    pub async fn revoke(&self, subject: &str) -> Result<(), TokenError> {
        let current = self.db.fetch_latest_token_for_subject(subject).await?;
        let revoked = self.db.revoke_tokens_for_subject(subject).await?;
        if revoked == 0 {
            debug!("🔑️ Revoke for {subject} was a no-op. No active tokens on record.");
            return Ok(());
        }
        if let Some(token) = current {
            if let Err(e) = self.exchanger.revoke(&token.access_token).await {
                warn!("🔑️ Could not notify the partner of the revocation for {subject}: {e}");
            }
        }
        info!("🔑️ Revoked {revoked} token(s) for {subject}");
        Ok(())
    }

    /// Read-only validity lookup. Never mutates state.
    pub async fn introspect(&self, access_token: &str) -> Result<TokenIntrospection, TokenError> {
        let token = self.db.fetch_token_by_access_token(access_token).await?;
        let result = match token {
            Some(t) => TokenIntrospection {
                active: t.is_active(Utc::now()),
                expires_at: Some(t.expires_at),
                scopes: Some(t.scopes),
            },
            None => TokenIntrospection { active: false, expires_at: None, scopes: None },
        };
        Ok(result)
    }

    async fn fresh_token(&self, subject: &str, scopes: &str) -> Result<Option<AuthToken>, TokenError> {
        let cutoff = Utc::now() + self.expiry_margin;
        let token = self
            .db
            .fetch_token(subject, scopes)
            .await?
            .filter(|t| !t.revoked && t.expires_at > cutoff);
        Ok(token)
    }

    async fn exchange_with_retry(&self, subject: &str, scopes: &str) -> Result<TokenGrant, TokenError> {
        let mut delay = self.retry_base;
        let mut last_error = String::new();
        for attempt in 1..=self.retry_attempts {
            match self.exchanger.exchange(subject, scopes).await {
                Ok(grant) => return Ok(grant),
                Err(GatewayError::Rejected { status, message }) => {
                    warn!("🔑️ Token exchange for {subject} rejected with status {status}: {message}");
                    return Err(TokenError::CredentialsRejected(message));
                },
                Err(GatewayError::Transient(e)) => {
                    warn!("🔑️ Token exchange attempt {attempt}/{} for {subject} failed: {e}", self.retry_attempts);
                    last_error = e;
                },
            }
            if attempt < self.retry_attempts {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
        Err(TokenError::Transient(format!(
            "Token exchange failed after {} attempts. Last error: {last_error}",
            self.retry_attempts
        )))
    }

    async fn store_grant(&self, subject: &str, scopes: &str, grant: TokenGrant) -> Result<AuthToken, TokenError> {
        // Tokens are cached under the *requested* canonical scope set so that subsequent acquires hit the cache.
        // A narrowed grant is worth knowing about, but it does not change the cache key.
        if !grant.scope.is_empty() && canonical_scopes(&grant.scope) != scopes {
            warn!("🔑️ Partner granted scopes [{}] instead of requested [{scopes}] for {subject}", grant.scope);
        }
        let token = NewAuthToken {
            subject: subject.to_string(),
            scopes: scopes.to_string(),
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at: Utc::now() + Duration::seconds(grant.expires_in),
        };
        Ok(self.db.store_token(token).await?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scope_canonicalisation_sorts_and_dedups() {
        assert_eq!(canonical_scopes("eats.store eats.order"), "eats.order eats.store");
        assert_eq!(canonical_scopes("  eats.order   eats.order eats.report "), "eats.order eats.report");
        assert_eq!(canonical_scopes(""), "");
    }
}
