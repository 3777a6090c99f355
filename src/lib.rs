pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod password;
pub mod rate_limit;
pub mod session;

use api::{AppState, create_api_router, create_token_router};
use axum::Router;
use db::Database;
use jwt::TokenCodec;
use rate_limit::RateLimitConfig;
use session::SessionManager;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Signs and verifies access and refresh tokens
    pub codec: TokenCodec,
    /// Role assigned to newly created accounts
    pub default_role: String,
    /// Whether to set Secure flag on the refresh cookie
    pub secure_cookies: bool,
    /// Per-IP limits for login and account creation
    pub rate_limit: RateLimitConfig,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let sessions = Arc::new(SessionManager::new(
        config.db.users(),
        config.db.tokens(),
        Arc::new(config.codec.clone()),
        config.default_role.clone(),
    ));

    let state = AppState {
        sessions,
        secure_cookies: config.secure_cookies,
    };
    let rate_limit = Arc::new(config.rate_limit.clone());

    Router::new()
        .nest("/api", create_api_router(state.clone(), rate_limit.clone()))
        .merge(create_token_router(state, rate_limit))
}

/// Purge expired refresh tokens. Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(db).await;
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to purge expired tokens on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    init_cleanup(&config.db).await;

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
