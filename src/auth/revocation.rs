/// Revoked token identifiers
use super::TokenKind;
use crate::clock::Clock;
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use std::sync::Arc;

/// Append-only set of revoked jti values
///
/// Rows are only worth keeping until the token would have expired anyway;
/// `purge_expired` drops the rest.
#[derive(Clone)]
pub struct RevocationStore {
    clock: Arc<dyn Clock>,
}

impl RevocationStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub async fn is_revoked(&self, conn: &mut SqliteConnection, jti: &str) -> Result<bool, sqlx::Error> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM revoked_tokens WHERE jti = ?1")
            .bind(jti)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(found.is_some())
    }

    /// Record a revocation; returns false if the jti was already revoked
    pub async fn revoke(
        &self,
        conn: &mut SqliteConnection,
        jti: &str,
        user_id: i64,
        kind: TokenKind,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO revoked_tokens (jti, user_id, token_kind, revoked_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(jti) DO NOTHING",
        )
        .bind(jti)
        .bind(user_id)
        .bind(kind.as_str())
        .bind(self.clock.now().timestamp())
        .bind(expires_at.timestamp())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete rows whose token has expired; returns the number removed
    pub async fn purge_expired(&self, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at <= ?1")
            .bind(self.clock.now().timestamp())
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }
}
