/// Single-active refresh token per user
use super::password::SecretHasher;
use crate::{
    clock::Clock,
    db::models::{from_unix, RefreshTokenRecord},
    error::ApiResult,
};
use chrono::Duration;
use sqlx::{Row, SqliteConnection};
use std::sync::Arc;

/// Hashed refresh tokens, replaced wholesale on every rotation
///
/// All methods run on the caller's connection so they join the caller's
/// transaction. Call `lock` first in any unit of work that later rotates, so
/// concurrent rotations for the same user serialize.
#[derive(Clone)]
pub struct RefreshTokenStore {
    hasher: SecretHasher,
    clock: Arc<dyn Clock>,
}

impl RefreshTokenStore {
    pub fn new(hasher: SecretHasher, clock: Arc<dyn Clock>) -> Self {
        Self { hasher, clock }
    }

    /// Take the database write lock before any read in this unit of work
    pub async fn lock(&self, conn: &mut SqliteConnection, user_id: i64) -> ApiResult<()> {
        sqlx::query("UPDATE refresh_tokens SET user_id = user_id WHERE user_id = ?1")
            .bind(user_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Replace every record for the user with one holding a hash of `plaintext`
    pub async fn rotate(
        &self,
        conn: &mut SqliteConnection,
        user_id: i64,
        plaintext: &str,
        ttl: Duration,
    ) -> ApiResult<()> {
        let token_hash = self.hash(plaintext).await?;
        self.replace(conn, user_id, &token_hash, ttl).await
    }

    /// Hash a refresh token for a later `replace`; needs no connection
    pub async fn hash(&self, plaintext: &str) -> ApiResult<String> {
        self.hasher.hash_blocking(plaintext.to_string()).await
    }

    /// `rotate` with a hash computed ahead of time
    pub async fn replace(
        &self,
        conn: &mut SqliteConnection,
        user_id: i64,
        token_hash: &str,
        ttl: Duration,
    ) -> ApiResult<()> {
        let expires_at = self.clock.now() + ttl;

        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?1")
            .bind(user_id)
            .execute(&mut *conn)
            .await?;

        sqlx::query("INSERT INTO refresh_tokens (user_id, token_hash, expires_at) VALUES (?1, ?2, ?3)")
            .bind(user_id)
            .bind(token_hash)
            .bind(expires_at.timestamp())
            .execute(&mut *conn)
            .await?;

        tracing::debug!(user_id, "refresh token rotated");
        Ok(())
    }

    pub async fn current(
        &self,
        conn: &mut SqliteConnection,
        user_id: i64,
    ) -> ApiResult<Option<RefreshTokenRecord>> {
        let row = sqlx::query(
            "SELECT user_id, token_hash, expires_at FROM refresh_tokens
             WHERE user_id = ?1 ORDER BY id DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Ok(Some(RefreshTokenRecord {
                user_id: row.try_get("user_id")?,
                token_hash: row.try_get("token_hash")?,
                expires_at: from_unix(row.try_get("expires_at")?)?,
            })),
            None => Ok(None),
        }
    }

    /// Check `presented` against the stored hash; false if absent or expired
    pub async fn verify(
        &self,
        conn: &mut SqliteConnection,
        user_id: i64,
        presented: &str,
    ) -> ApiResult<bool> {
        match self.current(conn, user_id).await? {
            Some(record) => self.verify_record(&record, presented).await,
            None => Ok(false),
        }
    }

    /// Check `presented` against an already loaded record
    pub async fn verify_record(&self, record: &RefreshTokenRecord, presented: &str) -> ApiResult<bool> {
        if !record.is_active(self.clock.now()) {
            return Ok(false);
        }
        self.hasher
            .verify_blocking(presented.to_string(), record.token_hash.clone())
            .await
    }

    /// Whether `token_hash` is still the user's live record
    pub async fn is_current(
        &self,
        conn: &mut SqliteConnection,
        user_id: i64,
        token_hash: &str,
    ) -> ApiResult<bool> {
        Ok(matches!(
            self.current(conn, user_id).await?,
            Some(record) if record.token_hash == token_hash && record.is_active(self.clock.now())
        ))
    }

    /// Delete every record for the user
    pub async fn invalidate(&self, conn: &mut SqliteConnection, user_id: i64) -> ApiResult<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?1")
            .bind(user_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn purge_expired(&self, conn: &mut SqliteConnection) -> ApiResult<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= ?1")
            .bind(self.clock.now().timestamp())
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_for_user(&self, conn: &mut SqliteConnection, user_id: i64) -> ApiResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM refresh_tokens WHERE user_id = ?1")
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::password::Argon2Params,
        clock::ManualClock,
        db::{
            models::{NewUser, Role},
            testing::temp_pool,
            users,
        },
    };

    async fn setup() -> (sqlx::SqlitePool, tempfile::TempDir, RefreshTokenStore, Arc<ManualClock>, i64) {
        let (pool, dir) = temp_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let user = users::create(
            &mut conn,
            NewUser {
                full_name: None,
                email: "refresh@example.com".to_string(),
                password_hash: "x".to_string(),
                role: Role::User,
            },
        )
        .await
        .unwrap();

        let clock = Arc::new(ManualClock::starting_now());
        let store = RefreshTokenStore::new(
            SecretHasher::new(Argon2Params::insecure_fast()).unwrap(),
            clock.clone(),
        );
        (pool, dir, store, clock, user.id)
    }

    #[tokio::test]
    async fn test_rotation_supersedes_previous_token() {
        let (pool, _dir, store, _clock, user_id) = setup().await;
        let mut conn = pool.acquire().await.unwrap();

        store.rotate(&mut conn, user_id, "first", Duration::seconds(60)).await.unwrap();
        assert!(store.verify(&mut conn, user_id, "first").await.unwrap());
        assert!(!store.verify(&mut conn, user_id, "other").await.unwrap());

        store.rotate(&mut conn, user_id, "second", Duration::seconds(60)).await.unwrap();
        assert!(!store.verify(&mut conn, user_id, "first").await.unwrap());
        assert!(store.verify(&mut conn, user_id, "second").await.unwrap());
        assert_eq!(store.count_for_user(&mut conn, user_id).await.unwrap(), 1);

        let record = store.current(&mut conn, user_id).await.unwrap().unwrap();
        assert_ne!(record.token_hash, "second");
    }

    #[tokio::test]
    async fn test_verify_fails_closed() {
        let (pool, _dir, store, clock, user_id) = setup().await;
        let mut conn = pool.acquire().await.unwrap();

        assert!(!store.verify(&mut conn, user_id, "anything").await.unwrap());

        store.rotate(&mut conn, user_id, "token", Duration::seconds(30)).await.unwrap();
        clock.advance(Duration::seconds(30));
        assert!(!store.verify(&mut conn, user_id, "token").await.unwrap());

        assert_eq!(store.purge_expired(&mut conn).await.unwrap(), 1);
        assert_eq!(store.count_for_user(&mut conn, user_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_precomputed_hash_and_currency_check() {
        let (pool, _dir, store, clock, user_id) = setup().await;
        let mut conn = pool.acquire().await.unwrap();

        let first = store.hash("first").await.unwrap();
        store.replace(&mut conn, user_id, &first, Duration::seconds(60)).await.unwrap();
        let record = store.current(&mut conn, user_id).await.unwrap().unwrap();
        assert!(store.verify_record(&record, "first").await.unwrap());
        assert!(store.is_current(&mut conn, user_id, &first).await.unwrap());

        store.rotate(&mut conn, user_id, "second", Duration::seconds(60)).await.unwrap();
        assert!(!store.is_current(&mut conn, user_id, &first).await.unwrap());

        let second = store.current(&mut conn, user_id).await.unwrap().unwrap();
        clock.advance(Duration::seconds(60));
        assert!(!store.verify_record(&second, "second").await.unwrap());
        assert!(!store
            .is_current(&mut conn, user_id, &second.token_hash)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_invalidate_removes_all() {
        let (pool, _dir, store, _clock, user_id) = setup().await;
        let mut conn = pool.acquire().await.unwrap();

        store.rotate(&mut conn, user_id, "token", Duration::seconds(60)).await.unwrap();
        assert_eq!(store.invalidate(&mut conn, user_id).await.unwrap(), 1);
        assert!(!store.verify(&mut conn, user_id, "token").await.unwrap());
    }

    #[tokio::test]
    async fn test_rollback_discards_rotation() {
        let (pool, _dir, store, _clock, user_id) = setup().await;
        {
            let mut conn = pool.acquire().await.unwrap();
            store.rotate(&mut conn, user_id, "kept", Duration::seconds(60)).await.unwrap();
        }

        let mut tx = pool.begin().await.unwrap();
        store.lock(&mut tx, user_id).await.unwrap();
        store.rotate(&mut tx, user_id, "dropped", Duration::seconds(60)).await.unwrap();
        drop(tx);

        let mut conn = pool.acquire().await.unwrap();
        assert!(store.verify(&mut conn, user_id, "kept").await.unwrap());
        assert!(!store.verify(&mut conn, user_id, "dropped").await.unwrap());
    }
}
