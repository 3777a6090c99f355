//! Account creation.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::AppState;
use super::error::ApiError;
use crate::rate_limit::{RateLimitConfig, rate_limit_user_create};

pub fn router(state: AppState, rate_limit: Arc<RateLimitConfig>) -> Router {
    Router::new()
        .route("/create_account", post(create_account))
        .route("/v1/create_account", post(create_account))
        .with_state(state)
        .layer(middleware::from_fn_with_state(
            rate_limit,
            rate_limit_user_create,
        ))
}

#[derive(Deserialize)]
struct CreateAccountRequest {
    username: String,
    email: String,
    password: String,
}

#[derive(Serialize)]
struct CreateAccountResponse {
    message: &'static str,
}

async fn create_account(
    State(state): State<AppState>,
    payload: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    state
        .sessions
        .create_account(&payload.username, &payload.email, &payload.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateAccountResponse {
            message: "Account created successfully",
        }),
    ))
}
