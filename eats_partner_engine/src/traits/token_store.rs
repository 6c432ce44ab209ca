use thiserror::Error;

use crate::db_types::{AuthToken, NewAuthToken};

#[derive(Debug, Clone, Error)]
pub enum TokenStoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for TokenStoreError {
    fn from(e: sqlx::Error) -> Self {
        TokenStoreError::DatabaseError(e.to_string())
    }
}

/// Storage contract for issued OAuth credentials.
///
/// The store upholds the single-active-token invariant: [`store_token`] revokes any other active token for the same
/// (subject, scopes) pair in the same transaction as the insert.
#[allow(async_fn_in_trait)]
pub trait TokenStore: Clone {
    /// The newest non-revoked token for the subject and canonical scope set, expired or not. Callers decide whether
    /// the expiry is close enough to warrant an exchange.
    async fn fetch_token(&self, subject: &str, scopes: &str) -> Result<Option<AuthToken>, TokenStoreError>;

    /// The newest non-revoked token for the subject across all scope sets.
    async fn fetch_latest_token_for_subject(&self, subject: &str) -> Result<Option<AuthToken>, TokenStoreError>;

    async fn fetch_token_by_access_token(&self, access_token: &str) -> Result<Option<AuthToken>, TokenStoreError>;

    /// Atomically revokes any active token for the (subject, scopes) pair and stores the replacement.
    async fn store_token(&self, token: NewAuthToken) -> Result<AuthToken, TokenStoreError>;

    /// Marks every token for the subject revoked. Returns the number of rows touched; revoking a subject with no
    /// active tokens is a successful no-op.
    async fn revoke_tokens_for_subject(&self, subject: &str) -> Result<u64, TokenStoreError>;
}
