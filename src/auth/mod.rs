//! HTTP-side session plumbing: cookies, client IP resolution and the bearer
//! token extractor.
//!
//! Access tokens travel in the `Authorization: Bearer` header and are never
//! stored. Refresh tokens travel in an HttpOnly cookie and are tracked in the
//! ledger, bound to the client IP that obtained them.

mod cookie;
mod extractors;
mod ip;
mod state;

pub use cookie::{REFRESH_COOKIE_NAME, clear_refresh_cookie, get_cookie, refresh_cookie};
pub use extractors::{BearerUser, ClientContext};
pub use ip::{HasHeadersAndExtensions, extract_client_ip};
pub use state::{HasSessionManager, Sessions};
