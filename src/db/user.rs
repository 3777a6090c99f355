use sqlx::sqlite::SqlitePool;

use super::store::{ConflictField, CredentialStore, StoreError, unique_violation};

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

#[derive(Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    /// Unix seconds of the last successful authentication
    pub last_access: i64,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("last_access", &self.last_access)
            .finish_non_exhaustive()
    }
}

/// Fields required to create a user.
#[derive(Debug, Clone, Copy)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: &'a str,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Delete a user and all of their refresh tokens in one transaction.
    pub async fn delete_user(&self, id: i64) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}

impl CredentialStore for UserStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row: Option<User> = sqlx::query_as(
            "SELECT id, username, email, password_hash, role, last_access FROM users WHERE username = ? COLLATE BINARY",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let row: Option<User> = sqlx::query_as(
            "SELECT id, username, email, password_hash, role, last_access FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn create_user(&self, user: NewUser<'_>) -> Result<User, StoreError> {
        let row: User = sqlx::query_as(
            "INSERT INTO users (username, email, password_hash, role) VALUES (?, ?, ?, ?)
             RETURNING id, username, email, password_hash, role, last_access",
        )
        .bind(user.username)
        .bind(user.email)
        .bind(user.password_hash)
        .bind(user.role)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let field = unique_violation(&e).map(|msg| {
                if msg.contains("users.email") {
                    ConflictField::Email
                } else {
                    ConflictField::Username
                }
            });
            match field {
                Some(field) => StoreError::Conflict(field),
                None => StoreError::Database(e),
            }
        })?;
        Ok(row)
    }

    async fn touch_last_access(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE users SET last_access = CAST(strftime('%s', 'now') AS INTEGER) WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
