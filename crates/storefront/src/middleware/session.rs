//! Session middleware configuration.
//!
//! Sessions live in `PostgreSQL` (`shop.session`) in production so every
//! instance sees the same sign-ins; tests pass an in-memory store instead.

use secrecy::ExposeSecret;
use tower_sessions::cookie::{Key, SameSite, time::Duration};
use tower_sessions::{Expiry, SessionManagerLayer, SessionStore};

use crate::config::{ConfigError, ShopConfig};

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "modernshop_session";

/// Session expiry time in seconds (24 hours of inactivity).
const SESSION_EXPIRY_SECONDS: i64 = 24 * 60 * 60;

/// Create the session layer around `store`.
///
/// # Errors
///
/// Returns `ConfigError::InsecureSecret` if the session secret is too short
/// to sign cookies.
pub fn create_session_layer<S: SessionStore + Clone>(
    store: S,
    config: &ShopConfig,
) -> Result<SessionManagerLayer<S, tower_sessions::service::SignedCookie>, ConfigError> {
    let key = Key::try_from(config.session_secret.expose_secret().as_bytes()).map_err(|_| {
        ConfigError::InsecureSecret(
            "MODERNSHOP_SESSION_SECRET".to_owned(),
            "too short to sign cookies".to_owned(),
        )
    })?;

    Ok(SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(Duration::seconds(
            SESSION_EXPIRY_SECONDS,
        )))
        .with_secure(config.secure_cookies())
        .with_same_site(SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
        .with_signed(key))
}
