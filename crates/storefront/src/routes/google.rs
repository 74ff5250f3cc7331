//! Google sign-in route handlers.
//!
//! - Start: store a random `state` and redirect to Google
//! - Callback: check `state`, exchange the code, then either sign in or
//!   park a code challenge in the session and send the browser to the code form
//! - Verify / complete: finish the challenge from the JSON API

use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use modernshop_core::Username;

use crate::error::{AppError, Result};
use crate::middleware::establish_session;
use crate::models::{GoogleAuthChallenge, session_keys};
use crate::routes::auth::SessionResponse;
use crate::services::auth::{AuthError, OAuthOutcome, OAuthVerifyOutcome};
use crate::services::google::generate_state;
use crate::state::AppState;

/// Browser page that collects the emailed code.
const OTP_PAGE: &str = "/google-otp.html";
/// Browser page that asks a new Google user for a username.
const COMPLETE_PAGE: &str = "/google-complete.html";

fn login_error(code: &str) -> Response {
    Redirect::to(&format!("/login.html?error={code}")).into_response()
}

/// Query parameters from the Google callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub otp: String,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub username: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RedirectResponse {
    pub message: &'static str,
    pub redirect: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedInResponse {
    #[serde(flatten)]
    pub session: SessionResponse,
    pub redirect: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfoResponse {
    pub has_session: bool,
    pub email_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_otp: Option<String>,
    pub otp_verified: bool,
}

async fn load_challenge(session: &Session) -> Result<Option<GoogleAuthChallenge>> {
    Ok(session.get(session_keys::GOOGLE_AUTH).await?)
}

/// `GET /auth/google`
pub async fn start(State(state): State<AppState>, session: Session) -> Result<Response> {
    let provider = state
        .oauth()
        .ok_or_else(|| AppError::NotFound("Google sign-in is not configured".to_owned()))?;

    let oauth_state = generate_state();
    session
        .insert(session_keys::GOOGLE_OAUTH_STATE, &oauth_state)
        .await?;

    Ok(Redirect::to(&provider.authorization_url(&oauth_state)).into_response())
}

/// `GET /auth/google/callback`
///
/// Failures redirect back to the login page with an error code.
pub async fn callback(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<CallbackQuery>,
) -> Result<Response> {
    let provider = state
        .oauth()
        .ok_or_else(|| AppError::NotFound("Google sign-in is not configured".to_owned()))?;

    if let Some(error) = query.error {
        tracing::warn!(error = %error, "Google sign-in refused");
        return Ok(login_error("google_denied"));
    }

    // State is single use whether or not it matches.
    let stored_state: Option<String> = session.remove(session_keys::GOOGLE_OAUTH_STATE).await?;
    if stored_state.is_none() || stored_state != query.state {
        tracing::warn!("Google OAuth state mismatch");
        return Ok(login_error("invalid_state"));
    }

    let Some(code) = query.code else {
        tracing::warn!("Google OAuth callback missing code");
        return Ok(login_error("missing_code"));
    };

    let profile = match provider.exchange_code(&code).await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::error!(error = %e, "Failed to exchange Google OAuth code");
            return Ok(login_error("google_failed"));
        }
    };

    match state.auth_service().oauth_callback(profile).await {
        Ok(OAuthOutcome::Authenticated(user)) => {
            establish_session(&session, &user).await?;
            Ok(Redirect::to("/").into_response())
        }
        Ok(OAuthOutcome::OtpRequired(challenge)) => {
            session.insert(session_keys::GOOGLE_AUTH, &*challenge).await?;
            Ok(Redirect::to(OTP_PAGE).into_response())
        }
        Err(AuthError::OAuthEmailMissing) => Ok(login_error("no_email")),
        Err(e) => Err(e.into()),
    }
}

/// `POST /api/auth/google/verify-otp`
pub async fn verify_otp(
    State(state): State<AppState>,
    session: Session,
    payload: std::result::Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(req) = payload?;
    let mut challenge = load_challenge(&session)
        .await?
        .ok_or(AuthError::OAuthSessionMissing)?;

    match state
        .auth_service()
        .verify_oauth_otp(&mut challenge, &req.otp)
        .await?
    {
        OAuthVerifyOutcome::Authenticated(user) => {
            session
                .remove::<GoogleAuthChallenge>(session_keys::GOOGLE_AUTH)
                .await?;
            establish_session(&session, &user).await?;
            Ok(Json(SignedInResponse {
                session: SessionResponse::for_user("Login successful", &user),
                redirect: "/",
            })
            .into_response())
        }
        OAuthVerifyOutcome::ProfileRequired => {
            session.insert(session_keys::GOOGLE_AUTH, &challenge).await?;
            Ok(Json(RedirectResponse {
                message: "OTP verified. Choose a username to finish signing up.",
                redirect: COMPLETE_PAGE,
            })
            .into_response())
        }
    }
}

/// `POST /api/auth/google/complete`
pub async fn complete(
    State(state): State<AppState>,
    session: Session,
    payload: std::result::Result<Json<CompleteRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(req) = payload?;
    let challenge = load_challenge(&session)
        .await?
        .ok_or(AuthError::OtpNotVerified)?;

    let user = state
        .auth_service()
        .complete_oauth_profile(&challenge, req.username.as_deref(), req.phone.as_deref())
        .await?;

    session
        .remove::<GoogleAuthChallenge>(session_keys::GOOGLE_AUTH)
        .await?;
    establish_session(&session, &user).await?;

    Ok((
        StatusCode::CREATED,
        Json(SignedInResponse {
            session: SessionResponse::for_user("Signup successful", &user),
            redirect: "/",
        }),
    ))
}

/// `GET /api/auth/google/session-info`
///
/// Lets the code form show the fallback code when email failed.
pub async fn session_info(session: Session) -> Result<Json<SessionInfoResponse>> {
    let challenge = load_challenge(&session)
        .await?
        .ok_or(AuthError::OAuthSessionMissing)?;

    let fallback_otp = (!challenge.email_sent && !challenge.otp_verified).then(|| {
        tracing::debug!("Returning Google fallback code to the browser");
        challenge.otp.clone()
    });
    Ok(Json(SessionInfoResponse {
        has_session: true,
        email_sent: challenge.email_sent,
        fallback_otp,
        otp_verified: challenge.otp_verified,
    }))
}

/// Username suggestion for the completion form.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileHint {
    pub suggested_username: Option<Username>,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

/// `GET /api/auth/google/profile`
pub async fn profile_hint(session: Session) -> Result<Json<ProfileHint>> {
    let challenge = load_challenge(&session)
        .await?
        .filter(|c| c.otp_verified)
        .ok_or(AuthError::OtpNotVerified)?;

    let email = challenge.profile.email;
    Ok(Json(ProfileHint {
        suggested_username: email.as_ref().map(|e| Username::from_email(e, 0)),
        display_name: challenge.profile.display_name,
        email: email.map(String::from),
    }))
}
