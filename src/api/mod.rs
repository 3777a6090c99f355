mod error;
mod session;
mod users;

use axum::{Json, Router, routing::get};
use serde::Serialize;
use std::sync::Arc;

use crate::auth::{HasSessionManager, Sessions};
use crate::rate_limit::RateLimitConfig;

pub use error::ApiError;

/// State shared by every API handler.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<Sessions>,
    /// Whether to set the Secure flag on the refresh cookie
    pub secure_cookies: bool,
}

impl HasSessionManager for AppState {
    fn sessions(&self) -> &Arc<Sessions> {
        &self.sessions
    }
}

/// Create the API router, to be nested under `/api`.
pub fn create_api_router(state: AppState, rate_limit: Arc<RateLimitConfig>) -> Router {
    Router::new()
        .route("/healthcheck", get(healthcheck))
        .merge(session::router(state.clone(), rate_limit.clone()))
        .merge(users::router(state, rate_limit))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Liveness check; does not touch the database.
async fn healthcheck() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Root-level `POST /token` alias for login.
pub fn create_token_router(state: AppState, rate_limit: Arc<RateLimitConfig>) -> Router {
    session::token_router(state, rate_limit)
}
