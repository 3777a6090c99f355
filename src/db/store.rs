//! Repository traits consumed by the session manager.
//!
//! Both traits are implemented by the SQLite stores in this module. Tests
//! provide their own implementations to force collisions.

use std::future::Future;

use super::token::{NewRefreshToken, RefreshToken};
use super::user::{NewUser, User};

/// Which unique user attribute collided on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictField {
    Username,
    Email,
}

/// Storage-level failure.
#[derive(Debug)]
pub enum StoreError {
    /// The refresh token string already exists in the ledger
    DuplicateToken,
    /// A user with the same username or email already exists
    Conflict(ConflictField),
    /// Any other database failure
    Database(sqlx::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::DuplicateToken => write!(f, "Refresh token already exists"),
            StoreError::Conflict(ConflictField::Username) => write!(f, "Username already exists"),
            StoreError::Conflict(ConflictField::Email) => write!(f, "Email already in use"),
            StoreError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e)
    }
}

/// Returns the constraint message if `e` is a unique-constraint violation.
pub(super) fn unique_violation(e: &sqlx::Error) -> Option<&str> {
    match e {
        sqlx::Error::Database(db_err)
            if matches!(db_err.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
        {
            Some(db_err.message())
        }
        _ => None,
    }
}

/// Persisted user records.
pub trait CredentialStore: Send + Sync {
    /// Exact-match lookup by username.
    fn find_by_username(
        &self,
        username: &str,
    ) -> impl Future<Output = Result<Option<User>, StoreError>> + Send;

    fn find_by_id(&self, id: i64) -> impl Future<Output = Result<Option<User>, StoreError>> + Send;

    /// Insert a user. Fails with [`StoreError::Conflict`] when the username
    /// or email matches an existing user case-insensitively.
    fn create_user(
        &self,
        user: NewUser<'_>,
    ) -> impl Future<Output = Result<User, StoreError>> + Send;

    /// Set the user's last-access timestamp to now.
    fn touch_last_access(&self, id: i64) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Persisted refresh tokens keyed by token string.
pub trait RefreshTokenLedger: Send + Sync {
    /// Insert a token row. Fails with [`StoreError::DuplicateToken`] when the
    /// token string is already present; the existing row is left untouched.
    fn insert(
        &self,
        token: &NewRefreshToken,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send;

    fn find_by_value(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Option<RefreshToken>, StoreError>> + Send;

    /// Delete a token row. Returns whether a row was removed; a missing
    /// token is not an error.
    fn delete_by_value(&self, token: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;
}
