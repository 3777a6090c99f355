#![allow(dead_code)]

use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode},
};
use gatehouse::{
    ServerConfig, create_app, db::Database, jwt::TokenCodec, rate_limit::RateLimitConfig,
};
use jsonwebtoken::Algorithm;
use tower::ServiceExt;

pub const TEST_IP: &str = "127.0.0.1";
pub const ALT_IP: &str = "192.168.1.100";

pub const ACCESS_SECRET: &[u8] = b"test-access-secret-0123456789abcdef";
pub const REFRESH_SECRET: &[u8] = b"test-refresh-secret-0123456789abcdef";

pub fn test_codec() -> TokenCodec {
    TokenCodec::new(
        Algorithm::HS256,
        ACCESS_SECRET,
        REFRESH_SECRET,
        Duration::from_secs(15 * 60),
        Duration::from_secs(7 * 24 * 60 * 60),
    )
    .expect("Failed to build codec")
}

pub fn test_config(db: Database) -> ServerConfig {
    ServerConfig {
        db,
        codec: test_codec(),
        default_role: "user".to_string(),
        secure_cookies: true,
        rate_limit: RateLimitConfig::permissive(),
    }
}

/// Create a test app and return (app, db).
pub async fn create_test_app() -> (Router, Database) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    (create_app(&test_config(db.clone())), db)
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.expect("Request failed")
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&body).expect("Body is not JSON")
}

pub fn create_account_request(username: &str, email: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/create_account")
        .header("content-type", "application/json")
        .header("x-forwarded-for", TEST_IP)
        .body(Body::from(
            serde_json::json!({
                "username": username,
                "email": email,
                "password": password,
            })
            .to_string(),
        ))
        .unwrap()
}

pub fn login_request_at(uri: &str, username: &str, password: &str, ip: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded")
        .header("x-forwarded-for", ip)
        .header("user-agent", "gatehouse-tests/1.0")
        .body(Body::from(format!(
            "username={}&password={}",
            username, password
        )))
        .unwrap()
}

pub fn login_request(username: &str, password: &str, ip: &str) -> Request<Body> {
    login_request_at("/api/login", username, password, ip)
}

pub fn refresh_request(refresh_token: Option<&str>, ip: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/refresh")
        .header("x-forwarded-for", ip);
    if let Some(token) = refresh_token {
        builder = builder.header("cookie", format!("refresh_token={}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn logout_request(refresh_token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/logout")
        .header("x-forwarded-for", TEST_IP);
    if let Some(token) = refresh_token {
        builder = builder.header("cookie", format!("refresh_token={}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn whoami_request(access_token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri("/api/whoami");
    if let Some(token) = access_token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

/// Extract Set-Cookie headers from response
pub fn extract_set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Value of the refresh token cookie set by the response, if any
pub fn refresh_token_from(response: &Response<Body>) -> Option<String> {
    extract_set_cookies(response).iter().find_map(|c| {
        c.strip_prefix("refresh_token=")
            .and_then(|rest| rest.split(';').next())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}

/// Check if cookies contain a token being cleared (Max-Age=0)
pub fn has_cleared_cookie(cookies: &[String], cookie_name: &str) -> bool {
    cookies
        .iter()
        .any(|c| c.starts_with(&format!("{}=", cookie_name)) && c.contains("Max-Age=0"))
}

pub async fn create_account(app: &Router, username: &str, email: &str, password: &str) {
    let response = send(app, create_account_request(username, email, password)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

/// Log in and return (access_token, refresh_token).
pub async fn login(app: &Router, username: &str, password: &str, ip: &str) -> (String, String) {
    let response = send(app, login_request(username, password, ip)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let refresh = refresh_token_from(&response).expect("No refresh cookie");
    let json = body_json(response).await;
    let access = json["access_token"]
        .as_str()
        .expect("No access token")
        .to_string();
    (access, refresh)
}
