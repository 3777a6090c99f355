//! Startup purge of expired refresh tokens.
//!
//! Expiry is also enforced on every refresh, so this only keeps the ledger
//! from growing without bound across restarts.

use crate::db::Database;
use tracing::{error, info};

/// Delete expired refresh tokens once.
pub async fn run_cleanup(db: &Database) {
    match db.tokens().delete_expired().await {
        Ok(count) if count > 0 => info!(count, "Cleaned up expired refresh tokens"),
        Ok(_) => {}
        Err(e) => error!(error = %e, "Failed to clean up expired refresh tokens"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CredentialStore, NewRefreshToken, NewUser, RefreshTokenLedger};

    #[tokio::test]
    async fn test_run_cleanup_removes_only_expired() {
        let db = Database::open(":memory:").await.unwrap();
        let user = db
            .users()
            .create_user(NewUser {
                username: "alice",
                email: "alice@x.com",
                password_hash: "$argon2id$stub",
                role: "user",
            })
            .await
            .unwrap();

        for (token, expires_at) in [("old", 1), ("fresh", i64::MAX)] {
            db.tokens()
                .insert(&NewRefreshToken {
                    user_id: user.id,
                    token: token.to_string(),
                    issued_at: 0,
                    expires_at,
                    device_info: None,
                    ip_address: None,
                })
                .await
                .unwrap();
        }

        run_cleanup(&db).await;

        assert!(db.tokens().find_by_value("old").await.unwrap().is_none());
        assert!(db.tokens().find_by_value("fresh").await.unwrap().is_some());
    }
}
