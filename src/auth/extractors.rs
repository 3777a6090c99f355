//! Axum extractors for authentication.

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use super::ip::extract_client_ip;
use super::state::HasSessionManager;
use crate::api::ApiError;
use crate::db::User;
use crate::session::SessionError;

/// Longest `User-Agent` prefix recorded as device info.
const MAX_DEVICE_INFO_LENGTH: usize = 512;

/// Extractor for endpoints that require a bearer access token.
/// Resolves the token to its user and records the access.
pub struct BearerUser(pub User);

impl<S> FromRequestParts<S> for BearerUser
where
    S: HasSessionManager + Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(SessionError::InvalidToken)?;
        let user = state.sessions().authenticate(token).await?;
        Ok(BearerUser(user))
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Where a request came from: resolved client IP and `User-Agent`.
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub ip: Option<String>,
    pub device_info: Option<String>,
}

impl<S> FromRequestParts<S> for ClientContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let device_info = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(|ua| ua.chars().take(MAX_DEVICE_INFO_LENGTH).collect());

        Ok(ClientContext {
            ip: extract_client_ip(parts),
            device_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with_auth(value: &str) -> Parts {
        let (parts, _) = Request::builder()
            .header(header::AUTHORIZATION, value)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&parts_with_auth("Bearer abc.def")), Some("abc.def"));
        assert_eq!(bearer_token(&parts_with_auth("bearer abc.def")), Some("abc.def"));
        assert_eq!(bearer_token(&parts_with_auth("Basic dXNlcjpwdw==")), None);
        assert_eq!(bearer_token(&parts_with_auth("Bearer ")), None);
        assert_eq!(bearer_token(&parts_with_auth("Bearer")), None);
    }

    #[tokio::test]
    async fn test_client_context_reads_user_agent_and_ip() {
        let (mut parts, _) = Request::builder()
            .header(header::USER_AGENT, "curl/8.0")
            .header("x-forwarded-for", "10.1.2.3")
            .body(())
            .unwrap()
            .into_parts();

        let ctx = ClientContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ctx.ip.as_deref(), Some("10.1.2.3"));
        assert_eq!(ctx.device_info.as_deref(), Some("curl/8.0"));
    }
}
