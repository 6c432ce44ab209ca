use chrono::Utc;
use log::debug;
use sqlx::SqliteConnection;

use crate::db_types::{AuthToken, NewAuthToken};

pub async fn fetch_token(
    subject: &str,
    scopes: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<AuthToken>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM auth_tokens WHERE subject = $1 AND scopes = $2 AND revoked = 0 ORDER BY id DESC LIMIT 1",
    )
    .bind(subject)
    .bind(scopes)
    .fetch_optional(conn)
    .await
}

pub async fn fetch_latest_token_for_subject(
    subject: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<AuthToken>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM auth_tokens WHERE subject = $1 AND revoked = 0 ORDER BY id DESC LIMIT 1")
        .bind(subject)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_token_by_access_token(
    access_token: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<AuthToken>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM auth_tokens WHERE access_token = $1 ORDER BY id DESC LIMIT 1")
        .bind(access_token)
        .fetch_optional(conn)
        .await
}

/// Revokes any active token for the (subject, scopes) pair and inserts the replacement. Callers wrap this in a
/// transaction so the single-active-token invariant holds even under concurrent refreshes.
pub async fn replace_token(token: NewAuthToken, conn: &mut SqliteConnection) -> Result<AuthToken, sqlx::Error> {
    sqlx::query("UPDATE auth_tokens SET revoked = 1 WHERE subject = $1 AND scopes = $2 AND revoked = 0")
        .bind(&token.subject)
        .bind(&token.scopes)
        .execute(&mut *conn)
        .await?;
    let record: AuthToken = sqlx::query_as(
        r#"
            INSERT INTO auth_tokens (subject, scopes, access_token, refresh_token, issued_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(&token.subject)
    .bind(&token.scopes)
    .bind(&token.access_token)
    .bind(&token.refresh_token)
    .bind(Utc::now())
    .bind(token.expires_at)
    .fetch_one(conn)
    .await?;
    debug!("🗃️🔑️ Stored token #{} for subject {} [{}]", record.id, record.subject, record.scopes);
    Ok(record)
}

pub async fn revoke_tokens_for_subject(subject: &str, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let res = sqlx::query("UPDATE auth_tokens SET revoked = 1 WHERE subject = $1 AND revoked = 0")
        .bind(subject)
        .execute(conn)
        .await?;
    Ok(res.rows_affected())
}
