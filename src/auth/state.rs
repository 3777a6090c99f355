//! Router state access for session-aware extractors.

use std::sync::Arc;

use crate::db::{RefreshTokenStore, UserStore};
use crate::session::SessionManager;

/// Session manager backed by the SQLite stores.
pub type Sessions = SessionManager<UserStore, RefreshTokenStore>;

/// Trait for state types that expose the session manager.
pub trait HasSessionManager {
    fn sessions(&self) -> &Arc<Sessions>;
}
