//! JWT token generation and validation.
//!
//! Access and refresh tokens are signed with two independent secrets, so a
//! leaked access key cannot mint refresh tokens and vice versa.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Longest lifetime accepted for either token class (ten years).
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(3650 * 24 * 60 * 60);

/// Token class, selects the signing key and is embedded as the `typ` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenClass {
    /// Short-lived bearer token presented on each protected request
    Access,
    /// Long-lived token exchanged for new access tokens, tracked in the ledger
    Refresh,
}

/// Claims carried by both token classes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    /// Token class
    #[serde(rename = "typ")]
    pub class: TokenClass,
    /// JWT ID, makes every minted token unique even within the same second
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Result of issuing a token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The JWT token string
    pub token: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
}

#[derive(Clone)]
struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Signs and verifies access and refresh tokens.
#[derive(Clone)]
pub struct TokenCodec {
    algorithm: Algorithm,
    access: SigningKey,
    refresh: SigningKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    pub fn new(
        algorithm: Algorithm,
        access_secret: &[u8],
        refresh_secret: &[u8],
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<Self, JwtError> {
        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(JwtError::UnsupportedAlgorithm(format!("{:?}", algorithm)));
        }
        if access_secret == refresh_secret {
            return Err(JwtError::SharedSecret);
        }
        if access_ttl > MAX_TOKEN_TTL || refresh_ttl > MAX_TOKEN_TTL {
            return Err(JwtError::TtlTooLong);
        }

        Ok(Self {
            algorithm,
            access: SigningKey::from_secret(access_secret),
            refresh: SigningKey::from_secret(refresh_secret),
            access_ttl,
            refresh_ttl,
        })
    }

    /// Lifetime of newly issued access tokens.
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Lifetime of newly issued refresh tokens.
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    fn key(&self, class: TokenClass) -> &SigningKey {
        match class {
            TokenClass::Access => &self.access,
            TokenClass::Refresh => &self.refresh,
        }
    }

    /// Sign a token for `subject` that expires `ttl` from now.
    pub fn issue(
        &self,
        subject: &str,
        class: TokenClass,
        ttl: Duration,
    ) -> Result<IssuedToken, JwtError> {
        let now = unix_now()?;
        let exp = now
            .checked_add(ttl.as_secs())
            .filter(|exp| i64::try_from(*exp).is_ok())
            .ok_or(JwtError::TtlTooLong)?;

        let claims = Claims {
            sub: subject.to_string(),
            class,
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(
            &Header::new(self.algorithm),
            &claims,
            &self.key(class).encoding,
        )
        .map_err(JwtError::Encoding)?;

        Ok(IssuedToken {
            token,
            issued_at: now,
            expires_at: exp,
        })
    }

    /// Issue an access token with the configured access TTL.
    pub fn issue_access(&self, subject: &str) -> Result<IssuedToken, JwtError> {
        self.issue(subject, TokenClass::Access, self.access_ttl)
    }

    /// Issue a refresh token with the configured refresh TTL.
    pub fn issue_refresh(&self, subject: &str) -> Result<IssuedToken, JwtError> {
        self.issue(subject, TokenClass::Refresh, self.refresh_ttl)
    }

    /// Decode a token of the given class.
    ///
    /// Returns `None` for bad signatures, malformed input, expired tokens and
    /// tokens of the other class.
    pub fn verify(&self, token: &str, class: TokenClass) -> Option<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;

        let data = jsonwebtoken::decode::<Claims>(token, &self.key(class).decoding, &validation)
            .inspect_err(|e| tracing::debug!(error = %e, ?class, "Token rejected"))
            .ok()?;

        if data.claims.class != class {
            return None;
        }

        Some(data.claims)
    }
}

/// Parse a signing algorithm name such as `HS256`.
pub fn parse_algorithm(name: &str) -> Result<Algorithm, JwtError> {
    Algorithm::from_str(name.trim()).map_err(|_| JwtError::UnsupportedAlgorithm(name.to_string()))
}

/// Current Unix time in seconds.
pub fn unix_now() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| JwtError::TimeError)
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// System time error
    TimeError,
    /// Algorithm is not an HMAC algorithm or is unknown
    UnsupportedAlgorithm(String),
    /// Access and refresh secrets are identical
    SharedSecret,
    /// Expiry would not fit a stored Unix timestamp
    TtlTooLong,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::TimeError => write!(f, "System time error"),
            JwtError::UnsupportedAlgorithm(name) => {
                write!(f, "Unsupported signing algorithm: {}", name)
            }
            JwtError::SharedSecret => {
                write!(f, "Access and refresh tokens must use different secrets")
            }
            JwtError::TtlTooLong => write!(f, "Token lifetime is too long"),
        }
    }
}

impl std::error::Error for JwtError {}
