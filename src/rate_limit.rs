//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down credential
//! stuffing and signup spam.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};
use tracing::warn;

use crate::api::ApiError;
use crate::auth::extract_client_ip;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Key for requests whose client IP cannot be resolved.
const UNKNOWN_CLIENT: &str = "unknown";

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Per-IP limiter for login (5 attempts, then 1 per second)
    pub login: Arc<IpLimiter>,
    /// Per-IP limiter for account creation (3 per minute)
    pub user_create: Arc<IpLimiter>,
}

impl RateLimitConfig {
    /// Create rate limiters with the production limits.
    pub fn new() -> Self {
        Self::with_limits(
            Quota::per_second(NonZeroU32::MIN).allow_burst(nonzero(5)),
            Quota::per_minute(nonzero(3)),
        )
    }

    /// Limits high enough never to trigger during tests.
    pub fn permissive() -> Self {
        Self::with_limits(
            Quota::per_second(nonzero(10_000)),
            Quota::per_second(nonzero(10_000)),
        )
    }

    pub fn with_limits(login: Quota, user_create: Quota) -> Self {
        Self {
            login: Arc::new(RateLimiter::keyed(login)),
            user_create: Arc::new(RateLimiter::keyed(user_create)),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn nonzero(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN)
}

fn check(limiter: &IpLimiter, request: &Request, message: &'static str) -> Result<(), Response> {
    let ip = extract_client_ip(request).unwrap_or_else(|| UNKNOWN_CLIENT.to_string());
    limiter.check_key(&ip).map_err(|_| {
        warn!(client_ip = %ip, path = %request.uri().path(), "Rate limit exceeded");
        ApiError::too_many_requests(message).into_response()
    })
}

/// Middleware for rate limiting login.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    match check(
        &config.login,
        &request,
        "Too many login attempts. Please wait before trying again.",
    ) {
        Ok(()) => next.run(request).await,
        Err(response) => response,
    }
}

/// Middleware for rate limiting account creation.
pub async fn rate_limit_user_create(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    match check(
        &config.user_create,
        &request,
        "Too many signup attempts. Please wait before trying again.",
    ) {
        Ok(()) => next.run(request).await,
        Err(response) => response,
    }
}
