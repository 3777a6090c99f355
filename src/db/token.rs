//! Refresh token ledger.
//!
//! Only refresh tokens are stored, keyed by the full token string. Access
//! tokens are stateless and never touch the database.

use sqlx::sqlite::SqlitePool;

use super::store::{RefreshTokenLedger, StoreError, unique_violation};

/// A stored refresh token.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshToken {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub issued_at: i64,
    pub expires_at: i64,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
}

impl RefreshToken {
    /// Whether the stored expiry lies before `now` (Unix seconds).
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at < now
    }
}

/// A refresh token row to be inserted.
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub user_id: i64,
    pub token: String,
    pub issued_at: i64,
    pub expires_at: i64,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
}

/// SQLite-backed refresh token ledger.
#[derive(Clone)]
pub struct RefreshTokenStore {
    pool: SqlitePool,
}

impl RefreshTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Delete all expired tokens.
    pub async fn delete_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM refresh_tokens WHERE expires_at < CAST(strftime('%s', 'now') AS INTEGER)",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// List all unexpired refresh tokens for a user, newest first.
    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<RefreshToken>, StoreError> {
        let rows: Vec<RefreshToken> = sqlx::query_as(
            "SELECT id, user_id, token, issued_at, expires_at, device_info, ip_address
             FROM refresh_tokens
             WHERE user_id = ? AND expires_at >= CAST(strftime('%s', 'now') AS INTEGER)
             ORDER BY issued_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Delete all tokens for a user (logout everywhere).
    pub async fn delete_all_by_user(&self, user_id: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

impl RefreshTokenLedger for RefreshTokenStore {
    async fn insert(&self, token: &NewRefreshToken) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO refresh_tokens (user_id, token, issued_at, expires_at, device_info, ip_address)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(token.user_id)
        .bind(&token.token)
        .bind(token.issued_at)
        .bind(token.expires_at)
        .bind(token.device_info.as_deref())
        .bind(token.ip_address.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if unique_violation(&e).is_some() {
                StoreError::DuplicateToken
            } else {
                StoreError::Database(e)
            }
        })?;

        Ok(result.last_insert_rowid())
    }

    async fn find_by_value(&self, token: &str) -> Result<Option<RefreshToken>, StoreError> {
        let row: Option<RefreshToken> = sqlx::query_as(
            "SELECT id, user_id, token, issued_at, expires_at, device_info, ip_address
             FROM refresh_tokens WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_by_value(&self, token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
