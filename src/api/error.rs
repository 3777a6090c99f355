//! Shared error handling for API endpoints.

use axum::{
    Json,
    extract::rejection::{FormRejection, JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::db::ConflictField;
use crate::session::SessionError;

/// API error type with automatic response conversion.
///
/// Every variant carries a stable reason code and a human-readable message.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(&'static str, String),
    Unauthorized(&'static str, String),
    NotFound(&'static str, String),
    Conflict(&'static str, String),
    TooManyRequests(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(reason: &'static str, msg: impl Into<String>) -> Self {
        Self::BadRequest(reason, msg.into())
    }

    pub fn too_many_requests(msg: impl Into<String>) -> Self {
        Self::TooManyRequests(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(..) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(..) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(..) => StatusCode::NOT_FOUND,
            ApiError::Conflict(..) => StatusCode::CONFLICT,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        let reason = e.reason();
        let message = e.to_string();
        match e {
            SessionError::InvalidCredentials
            | SessionError::MissingToken
            | SessionError::InvalidToken
            | SessionError::TokenExpiredOrRevoked
            | SessionError::IpMismatch => ApiError::Unauthorized(reason, message),
            SessionError::Conflict(ConflictField::Username | ConflictField::Email) => {
                ApiError::Conflict(reason, message)
            }
            SessionError::UserNotFound => ApiError::NotFound(reason, message),
            SessionError::BadRequest(_) => ApiError::BadRequest(reason, message),
            SessionError::Internal => ApiError::Internal(message),
        }
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        ApiError::bad_request("invalid_request", rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request("invalid_request", rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error, message) = match self {
            ApiError::BadRequest(reason, msg)
            | ApiError::Unauthorized(reason, msg)
            | ApiError::NotFound(reason, msg)
            | ApiError::Conflict(reason, msg) => (reason, msg),
            ApiError::TooManyRequests(msg) => ("rate_limited", msg),
            ApiError::Internal(msg) => ("internal_error", msg),
        };
        (status, Json(ErrorResponse { error, message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_status_mapping() {
        let cases = [
            (SessionError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (SessionError::MissingToken, StatusCode::UNAUTHORIZED),
            (SessionError::IpMismatch, StatusCode::UNAUTHORIZED),
            (SessionError::UserNotFound, StatusCode::NOT_FOUND),
            (
                SessionError::Conflict(ConflictField::Email),
                StatusCode::CONFLICT,
            ),
            (SessionError::BadRequest("nope"), StatusCode::BAD_REQUEST),
            (SessionError::Internal, StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[tokio::test]
    async fn test_error_body_carries_reason_and_message() {
        let response = ApiError::from(SessionError::TokenExpiredOrRevoked).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "token_expired_or_revoked");
        assert_eq!(json["message"], "Token expired or revoked");
    }
}
