//! Session lifecycle: login, refresh, logout and request authentication.
//!
//! A session is identified by its refresh token string and moves through
//! none -> issued -> (refreshed)* -> revoked-or-expired. There is no active
//! flag; a session is live while its ledger row exists and has not expired.
//!
//! Refresh tokens are bound to the client IP that obtained them. A refresh
//! from any other address is rejected, including legitimate roaming between
//! networks.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::db::{
    ConflictField, CredentialStore, NewRefreshToken, NewUser, RefreshTokenLedger, StoreError, User,
};
use crate::jwt::{IssuedToken, TokenClass, TokenCodec, unix_now};
use crate::password;

/// Upper bound on refresh token mint-and-insert attempts per login.
pub const MAX_ISSUE_ATTEMPTS: usize = 1024;

const MAX_USERNAME_LENGTH: usize = 64;
const MAX_EMAIL_LENGTH: usize = 254;

/// Session failures surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Unknown username or wrong password, deliberately indistinguishable
    InvalidCredentials,
    /// No refresh token was presented
    MissingToken,
    /// Bad signature, malformed, expired or wrong-class token
    InvalidToken,
    /// Refresh token absent from the ledger or past its stored expiry
    TokenExpiredOrRevoked,
    /// Refresh attempted from a different client IP than at issuance
    IpMismatch,
    /// Username or email already taken
    Conflict(ConflictField),
    /// Token subject no longer exists
    UserNotFound,
    /// Rejected account input
    BadRequest(&'static str),
    /// Storage, codec or hashing failure (already logged)
    Internal,
}

impl SessionError {
    /// Stable machine-readable reason code.
    pub fn reason(&self) -> &'static str {
        match self {
            SessionError::InvalidCredentials => "invalid_credentials",
            SessionError::MissingToken => "missing_token",
            SessionError::InvalidToken => "invalid_token",
            SessionError::TokenExpiredOrRevoked => "token_expired_or_revoked",
            SessionError::IpMismatch => "ip_mismatch",
            SessionError::Conflict(ConflictField::Username) => "username_taken",
            SessionError::Conflict(ConflictField::Email) => "email_taken",
            SessionError::UserNotFound => "user_not_found",
            SessionError::BadRequest(_) => "invalid_request",
            SessionError::Internal => "internal_error",
        }
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::InvalidCredentials => write!(f, "Invalid credentials"),
            SessionError::MissingToken => write!(f, "Refresh token missing"),
            SessionError::InvalidToken => write!(f, "Invalid token"),
            SessionError::TokenExpiredOrRevoked => write!(f, "Token expired or revoked"),
            SessionError::IpMismatch => write!(f, "Token IP address mismatch"),
            SessionError::Conflict(ConflictField::Username) => write!(f, "Username already exists"),
            SessionError::Conflict(ConflictField::Email) => write!(f, "Email already in use"),
            SessionError::UserNotFound => write!(f, "User not found"),
            SessionError::BadRequest(msg) => write!(f, "{}", msg),
            SessionError::Internal => write!(f, "Internal server error"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Log an unexpected failure and collapse it into [`SessionError::Internal`].
trait InternalExt<T> {
    fn internal(self, context: &str) -> Result<T, SessionError>;
}

impl<T, E: std::fmt::Display> InternalExt<T> for Result<T, E> {
    fn internal(self, context: &str) -> Result<T, SessionError> {
        self.map_err(|e| {
            error!(error = %e, "{}", context);
            SessionError::Internal
        })
    }
}

/// Login input.
#[derive(Debug, Clone, Copy)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub client_ip: Option<&'a str>,
    pub device_info: Option<&'a str>,
}

/// Tokens produced by a successful login.
#[derive(Debug, Clone)]
pub struct LoginGrant {
    pub user_id: i64,
    pub access_token: String,
    pub refresh_token: String,
    /// Refresh cookie lifetime in seconds
    pub refresh_max_age: u64,
}

/// Access token produced by a successful refresh.
#[derive(Debug, Clone)]
pub struct AccessGrant {
    pub access_token: String,
}

/// Orchestrates the credential store, token codec and refresh token ledger.
pub struct SessionManager<C, L> {
    users: C,
    ledger: L,
    codec: Arc<TokenCodec>,
    default_role: String,
}

impl<C, L> SessionManager<C, L>
where
    C: CredentialStore,
    L: RefreshTokenLedger,
{
    pub fn new(users: C, ledger: L, codec: Arc<TokenCodec>, default_role: impl Into<String>) -> Self {
        Self {
            users,
            ledger,
            codec,
            default_role: default_role.into(),
        }
    }

    pub fn users(&self) -> &C {
        &self.users
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Verify credentials and issue an access token plus a ledger-tracked
    /// refresh token bound to the client IP.
    pub async fn login(&self, request: LoginRequest<'_>) -> Result<LoginGrant, SessionError> {
        let user = self
            .users
            .find_by_username(request.username)
            .await
            .internal("Failed to look up user")?;

        let plain = request.password.to_string();
        let verified = match &user {
            Some(user) => {
                let hash = user.password_hash.clone();
                tokio::task::spawn_blocking(move || password::verify_password(&hash, &plain))
                    .await
                    .internal("Password verification task failed")?
            }
            None => tokio::task::spawn_blocking(move || password::verify_against_dummy(&plain))
                .await
                .internal("Password verification task failed")?,
        };

        let user = match user {
            Some(user) if verified => user,
            _ => {
                warn!(username = %request.username, "Invalid credentials");
                return Err(SessionError::InvalidCredentials);
            }
        };

        let access = self
            .codec
            .issue_access(&user.username)
            .internal("Failed to generate access token")?;

        let refresh = self
            .store_refresh_token(&user, request.client_ip, request.device_info)
            .await?;

        self.touch(user.id).await;

        info!(
            username = %user.username,
            client_ip = request.client_ip.unwrap_or("unknown"),
            "Login succeeded"
        );

        Ok(LoginGrant {
            user_id: user.id,
            access_token: access.token,
            refresh_token: refresh.token,
            refresh_max_age: self.codec.refresh_ttl().as_secs(),
        })
    }

    /// Mint refresh tokens until one inserts without colliding.
    async fn store_refresh_token(
        &self,
        user: &User,
        client_ip: Option<&str>,
        device_info: Option<&str>,
    ) -> Result<IssuedToken, SessionError> {
        for attempt in 1..=MAX_ISSUE_ATTEMPTS {
            let issued = self
                .codec
                .issue_refresh(&user.username)
                .internal("Failed to generate refresh token")?;

            let row = NewRefreshToken {
                user_id: user.id,
                token: issued.token.clone(),
                issued_at: issued.issued_at as i64,
                expires_at: issued.expires_at as i64,
                device_info: device_info.map(str::to_string),
                ip_address: client_ip.map(str::to_string),
            };

            match self.ledger.insert(&row).await {
                Ok(_) => return Ok(issued),
                Err(StoreError::DuplicateToken) => {
                    warn!(attempt, "Duplicate refresh token detected, retrying");
                }
                Err(e) => {
                    error!(error = %e, "Failed to store refresh token");
                    return Err(SessionError::Internal);
                }
            }
        }

        error!(
            attempts = MAX_ISSUE_ATTEMPTS,
            username = %user.username,
            "Gave up issuing a unique refresh token"
        );
        Err(SessionError::Internal)
    }

    /// Exchange a refresh token for a new access token. The refresh token
    /// itself is not rotated.
    pub async fn refresh(
        &self,
        refresh_token: Option<&str>,
        client_ip: Option<&str>,
    ) -> Result<AccessGrant, SessionError> {
        let token = refresh_token
            .filter(|t| !t.is_empty())
            .ok_or(SessionError::MissingToken)?;

        let claims = self
            .codec
            .verify(token, TokenClass::Refresh)
            .ok_or_else(|| {
                warn!("Invalid refresh token");
                SessionError::InvalidToken
            })?;

        let stored = self
            .ledger
            .find_by_value(token)
            .await
            .internal("Failed to look up refresh token")?;

        let now = unix_now().internal("Failed to read clock")? as i64;
        let stored = match stored {
            Some(stored) if !stored.is_expired_at(now) => stored,
            _ => {
                warn!(username = %claims.sub, "Token expired or revoked");
                return Err(SessionError::TokenExpiredOrRevoked);
            }
        };

        if stored.ip_address.as_deref() != client_ip {
            warn!(
                username = %claims.sub,
                expected = stored.ip_address.as_deref().unwrap_or("none"),
                actual = client_ip.unwrap_or("none"),
                "IP address mismatch"
            );
            return Err(SessionError::IpMismatch);
        }

        let access = self
            .codec
            .issue_access(&claims.sub)
            .internal("Failed to generate access token")?;

        self.touch(stored.user_id).await;

        Ok(AccessGrant {
            access_token: access.token,
        })
    }

    /// Revoke a refresh token. Revoking an unknown token still succeeds.
    pub async fn logout(&self, refresh_token: Option<&str>) -> Result<(), SessionError> {
        let token = refresh_token
            .filter(|t| !t.is_empty())
            .ok_or(SessionError::MissingToken)?;

        let removed = self
            .ledger
            .delete_by_value(token)
            .await
            .internal("Failed to revoke refresh token")?;

        info!(removed, "Logged out");
        Ok(())
    }

    /// Resolve a bearer access token to its user and record the access.
    pub async fn authenticate(&self, access_token: &str) -> Result<User, SessionError> {
        let claims = self
            .codec
            .verify(access_token, TokenClass::Access)
            .ok_or(SessionError::InvalidToken)?;

        let user = self
            .users
            .find_by_username(&claims.sub)
            .await
            .internal("Failed to look up user")?
            .ok_or(SessionError::UserNotFound)?;

        self.touch(user.id).await;
        Ok(user)
    }

    /// Create an account with the deployment's default role.
    pub async fn create_account(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, SessionError> {
        let email = email.trim();

        if username.trim().is_empty() {
            return Err(SessionError::BadRequest("Username cannot be empty"));
        }
        // Login matches usernames exactly, so padding would make the account unreachable
        if username.trim() != username {
            return Err(SessionError::BadRequest(
                "Username cannot start or end with whitespace",
            ));
        }
        if username.chars().count() > MAX_USERNAME_LENGTH {
            return Err(SessionError::BadRequest("Username is too long"));
        }
        if email.len() > MAX_EMAIL_LENGTH || !email.contains('@') {
            return Err(SessionError::BadRequest("Invalid email address"));
        }
        if password.is_empty() {
            return Err(SessionError::BadRequest("Password cannot be empty"));
        }

        let plain = password.to_string();
        let hash = tokio::task::spawn_blocking(move || password::hash_password(&plain))
            .await
            .internal("Password hashing task failed")?
            .internal("Failed to hash password")?;

        let user = self
            .users
            .create_user(NewUser {
                username,
                email,
                password_hash: &hash,
                role: &self.default_role,
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict(field) => SessionError::Conflict(field),
                e => {
                    error!(error = %e, "Failed to create user");
                    SessionError::Internal
                }
            })?;

        info!(username = %user.username, "Account created");
        Ok(user)
    }

    async fn touch(&self, user_id: i64) {
        if let Err(e) = self.users.touch_last_access(user_id).await {
            warn!(error = %e, user_id, "Failed to update last access");
        }
    }
}
