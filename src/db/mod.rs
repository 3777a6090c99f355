mod store;
mod token;
mod user;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

/// How long a writer waits for a competing connection's lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub use store::{ConflictField, CredentialStore, RefreshTokenLedger, StoreError};
pub use token::{NewRefreshToken, RefreshToken, RefreshTokenStore};
pub use user::{NewUser, User, UserStore};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        let options = SqliteConnectOptions::from_str(&url)?
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                // Uniqueness is case-insensitive, storage keeps the original spelling
                "CREATE TABLE users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    email TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    password_hash TEXT NOT NULL,
                    role TEXT NOT NULL DEFAULT 'user',
                    last_access INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER)),
                    created_at INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER))
                )",
                // Refresh token ledger
                "CREATE TABLE refresh_tokens (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    token TEXT UNIQUE NOT NULL,
                    issued_at INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL,
                    device_info TEXT,
                    ip_address TEXT
                )",
                "CREATE INDEX idx_refresh_tokens_user_id ON refresh_tokens(user_id)",
                "CREATE INDEX idx_refresh_tokens_expires_at ON refresh_tokens(expires_at)",
            ],
        )
        .await
    }

    /// Get the user store.
    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone())
    }

    /// Get the refresh token store.
    pub fn tokens(&self) -> RefreshTokenStore {
        RefreshTokenStore::new(self.pool.clone())
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user<'a>(username: &'a str, email: &'a str) -> NewUser<'a> {
        NewUser {
            username,
            email,
            password_hash: "$argon2id$stub",
            role: "user",
        }
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = Database::open(":memory:").await.unwrap();

        let created = db
            .users()
            .create_user(new_user("alice", "alice@x.com"))
            .await
            .unwrap();

        let user = db.users().find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(user.id, created.id);
        assert_eq!(user.username, "alice");
        assert_eq!(user.email, "alice@x.com");
        assert_eq!(user.role, "user");

        let user = db.users().find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(user.username, "alice");
    }

    #[tokio::test]
    async fn test_username_conflict_is_case_insensitive() {
        let db = Database::open(":memory:").await.unwrap();

        db.users()
            .create_user(new_user("alice", "alice@x.com"))
            .await
            .unwrap();
        let result = db
            .users()
            .create_user(new_user("ALICE", "other@x.com"))
            .await;

        assert!(matches!(
            result,
            Err(StoreError::Conflict(ConflictField::Username))
        ));
    }

    #[tokio::test]
    async fn test_email_conflict_is_case_insensitive() {
        let db = Database::open(":memory:").await.unwrap();

        db.users()
            .create_user(new_user("alice", "alice@x.com"))
            .await
            .unwrap();
        let result = db.users().create_user(new_user("bob", "Alice@X.com")).await;

        assert!(matches!(
            result,
            Err(StoreError::Conflict(ConflictField::Email))
        ));
    }

    #[tokio::test]
    async fn test_lookup_is_exact_match() {
        let db = Database::open(":memory:").await.unwrap();

        db.users()
            .create_user(new_user("Alice", "alice@x.com"))
            .await
            .unwrap();

        assert!(db.users().find_by_username("Alice").await.unwrap().is_some());
        assert!(db.users().find_by_username("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_touch_last_access() {
        let db = Database::open(":memory:").await.unwrap();

        let user = db
            .users()
            .create_user(new_user("alice", "alice@x.com"))
            .await
            .unwrap();

        sqlx::query("UPDATE users SET last_access = 0 WHERE id = ?")
            .bind(user.id)
            .execute(db.pool())
            .await
            .unwrap();

        db.users().touch_last_access(user.id).await.unwrap();

        let user = db.users().find_by_id(user.id).await.unwrap().unwrap();
        assert!(user.last_access > 0);
    }

    #[tokio::test]
    async fn test_delete_user_cascades_tokens() {
        let db = Database::open(":memory:").await.unwrap();

        let user = db
            .users()
            .create_user(new_user("alice", "alice@x.com"))
            .await
            .unwrap();

        for value in ["token-a", "token-b"] {
            db.tokens()
                .insert(&NewRefreshToken {
                    user_id: user.id,
                    token: value.to_string(),
                    issued_at: 1,
                    expires_at: i64::MAX,
                    device_info: None,
                    ip_address: Some("127.0.0.1".to_string()),
                })
                .await
                .unwrap();
        }

        assert!(db.users().delete_user(user.id).await.unwrap());

        assert!(db.users().find_by_id(user.id).await.unwrap().is_none());
        assert!(db.tokens().find_by_value("token-a").await.unwrap().is_none());
        assert!(db.tokens().list_by_user(user.id).await.unwrap().is_empty());

        // Deleting again reports nothing removed
        assert!(!db.users().delete_user(user.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_foreign_key_cascade_without_explicit_delete() {
        let db = Database::open(":memory:").await.unwrap();

        let user = db
            .users()
            .create_user(new_user("alice", "alice@x.com"))
            .await
            .unwrap();
        db.tokens()
            .insert(&NewRefreshToken {
                user_id: user.id,
                token: "token-a".to_string(),
                issued_at: 1,
                expires_at: i64::MAX,
                device_info: None,
                ip_address: None,
            })
            .await
            .unwrap();

        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user.id)
            .execute(db.pool())
            .await
            .unwrap();

        assert!(db.tokens().find_by_value("token-a").await.unwrap().is_none());
    }
}
