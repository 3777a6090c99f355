//! Session endpoints.
//!
//! - POST `/login` - Verify credentials, return an access token and set the refresh cookie
//! - POST `/refresh` - Exchange the refresh cookie for a new access token
//! - POST `/logout` - Revoke the refresh token and clear the cookie
//! - GET `/whoami` - Username behind the bearer access token

use axum::{
    Form, Json, Router,
    extract::{State, rejection::FormRejection},
    http::{HeaderMap, header::SET_COOKIE},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::AppState;
use super::error::ApiError;
use crate::auth::{
    BearerUser, ClientContext, REFRESH_COOKIE_NAME, clear_refresh_cookie, get_cookie,
    refresh_cookie,
};
use crate::rate_limit::{RateLimitConfig, rate_limit_login};
use crate::session::{LoginRequest, SessionError};

pub fn router(state: AppState, rate_limit: Arc<RateLimitConfig>) -> Router {
    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(rate_limit, rate_limit_login));

    Router::new()
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/whoami", get(whoami))
        .with_state(state)
        .merge(login_router)
}

pub fn token_router(state: AppState, rate_limit: Arc<RateLimitConfig>) -> Router {
    Router::new()
        .route("/token", post(login))
        .with_state(state)
        .layer(middleware::from_fn_with_state(rate_limit, rate_limit_login))
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: &'static str,
}

impl TokenResponse {
    fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer",
        }
    }
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

async fn login(
    State(state): State<AppState>,
    client: ClientContext,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Form(form) = form?;
    let grant = state
        .sessions
        .login(LoginRequest {
            username: &form.username,
            password: &form.password,
            client_ip: client.ip.as_deref(),
            device_info: client.device_info.as_deref(),
        })
        .await?;

    let cookie = refresh_cookie(
        &grant.refresh_token,
        grant.refresh_max_age,
        state.secure_cookies,
    );

    Ok((
        [(SET_COOKIE, cookie)],
        Json(TokenResponse::bearer(grant.access_token)),
    ))
}

async fn refresh(
    State(state): State<AppState>,
    client: ClientContext,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = get_cookie(&headers, REFRESH_COOKIE_NAME);
    let grant = state.sessions.refresh(token, client.ip.as_deref()).await?;
    Ok(Json(TokenResponse::bearer(grant.access_token)))
}

async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = get_cookie(&headers, REFRESH_COOKIE_NAME);

    state.sessions.logout(token).await.map_err(|e| match e {
        // A logout without a cookie is a malformed request, not an auth failure
        SessionError::MissingToken => ApiError::bad_request(e.reason(), e.to_string()),
        e => e.into(),
    })?;

    Ok((
        [(SET_COOKIE, clear_refresh_cookie(state.secure_cookies))],
        Json(MessageResponse {
            message: "Logged out successfully".to_string(),
        }),
    ))
}

async fn whoami(BearerUser(user): BearerUser) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: user.username,
    })
}
