//! Authentication extractors and session helpers.
//!
//! The session only stores who is signed in. Privilege flags are re-read
//! from the user store by [`RequireUser`] and [`RequireAdmin`], so a
//! revocation takes effect on the next request.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use crate::error::{AppError, clear_sentry_user, set_sentry_user};
use crate::models::{CurrentUser, User, session_keys};
use crate::services::auth::{Action, Decision, authorize};
use crate::state::AppState;

fn session_of(parts: &Parts) -> Result<&Session, AppError> {
    parts
        .extensions
        .get::<Session>()
        .ok_or_else(|| AppError::Internal("session layer missing".to_owned()))
}

/// Extractor that requires a signed-in user.
///
/// ```rust,ignore
/// async fn handler(RequireAuth(user): RequireAuth) -> String {
///     format!("Hello, {}!", user.username)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = session_of(parts)?;
        let user: CurrentUser = session
            .get(session_keys::CURRENT_USER)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_owned()))?;
        Ok(Self(user))
    }
}

/// Extractor that optionally gets the signed-in user.
///
/// Unlike `RequireAuth`, this does not reject the request if nobody is
/// logged in.
pub struct OptionalAuth(pub Option<CurrentUser>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = match parts.extensions.get::<Session>() {
            Some(session) => session
                .get::<CurrentUser>(session_keys::CURRENT_USER)
                .await
                .ok()
                .flatten(),
            None => None,
        };

        Ok(Self(user))
    }
}

/// The signed-in user, freshly loaded from the store.
///
/// A session whose user has since been deleted is treated as signed out.
pub struct RequireUser(pub User);

impl FromRequestParts<AppState> for RequireUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let RequireAuth(current) = RequireAuth::from_request_parts(parts, state).await?;
        let user = state
            .users()
            .get_by_id(current.id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_owned()))?;
        Ok(Self(user))
    }
}

/// A signed-in administrator.
///
/// No session is 401; a user who is not an admin (or no longer exists) is 403.
pub struct RequireAdmin(pub User);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let RequireAuth(current) = RequireAuth::from_request_parts(parts, state).await?;
        let user = state
            .users()
            .get_by_id(current.id)
            .await?
            .ok_or_else(|| AppError::Forbidden("Admin access required".to_owned()))?;

        match authorize(user.capabilities(), Action::Administer) {
            Decision::Allow => Ok(Self(user)),
            Decision::Deny(reason) => {
                tracing::warn!(user_id = %user.id, "Admin access denied");
                Err(AppError::Forbidden(reason.message().to_owned()))
            }
        }
    }
}

/// Sign a user in: new session ID, then store the identity.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn establish_session(
    session: &Session,
    user: &User,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session
        .insert(
            session_keys::CURRENT_USER,
            CurrentUser {
                id: user.id,
                username: user.username.clone(),
            },
        )
        .await?;
    set_sentry_user(&user.id, user.username.as_str());
    Ok(())
}

/// Sign out: drop all session data and the cookie.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn end_session(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await?;
    clear_sentry_user();
    Ok(())
}
