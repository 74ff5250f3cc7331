//! Password and one-time-code authentication handlers.
//!
//! Handlers turn `AuthService` outcomes into JSON and own every session
//! write: a session is only ever established here after the service says
//! the user is authenticated.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use modernshop_core::{UserId, Username};

use crate::error::Result;
use crate::middleware::{OptionalAuth, RequireAuth, end_session, establish_session};
use crate::models::User;
use crate::services::auth::{LoginOutcome, OtpDelivery, SignupOutcome};
use crate::state::AppState;

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub otp: String,
}

/// Passwordless request. `email` may also hold a username.
#[derive(Debug, Deserialize)]
pub struct OtpRequest {
    #[serde(default, alias = "identifier", alias = "username")]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct OtpLoginRequest {
    #[serde(default, alias = "identifier", alias = "username")]
    pub email: String,
    #[serde(default)]
    pub otp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    #[serde(default)]
    pub new_password: String,
}

// =============================================================================
// Response Types
// =============================================================================

/// A pending code challenge.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    pub message: &'static str,
    #[serde(rename = "require2FA")]
    pub require_2fa: bool,
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_sent: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_otp: Option<String>,
}

impl ChallengeResponse {
    fn pending(user_id: UserId, delivery: &OtpDelivery, sent: &'static str) -> Self {
        Self {
            message: if delivery.email_sent() {
                sent
            } else {
                "Email delivery unavailable. Use the code provided to continue."
            },
            require_2fa: true,
            user_id,
            email_sent: Some(delivery.email_sent()),
            fallback_otp: delivery.fallback_code().map(str::to_owned),
        }
    }
}

/// A signed-in user.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub message: &'static str,
    pub username: Username,
    pub is_admin: bool,
    pub must_change_password: bool,
}

impl SessionResponse {
    pub(crate) fn for_user(message: &'static str, user: &User) -> Self {
        Self {
            message,
            username: user.username.clone(),
            is_admin: user.is_admin,
            must_change_password: user.must_change_password,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUser {
    pub username: Username,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub is_admin: bool,
    pub is_admin_verified: bool,
    pub is_verified: bool,
    pub must_change_password: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<StatusUser>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpSentResponse {
    pub message: &'static str,
    pub email_sent: bool,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

// =============================================================================
// Handlers
// =============================================================================

/// `POST /api/signup`
pub async fn signup(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SignupRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(req) = payload?;
    let outcome = state
        .auth_service()
        .signup(&req.username, &req.email, &req.password)
        .await?;

    let body = match outcome {
        SignupOutcome::OtpRequired { user, delivery } => ChallengeResponse::pending(
            user.id,
            &delivery,
            "Account created. Check your email for the verification code.",
        ),
        SignupOutcome::Verified(user) => ChallengeResponse {
            message: "Account created. You can now log in.",
            require_2fa: false,
            user_id: user.id,
            email_sent: None,
            fallback_otp: None,
        },
    };
    Ok((StatusCode::CREATED, Json(body)))
}

/// `POST /api/login`
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<axum::response::Response> {
    let Json(req) = payload?;
    match state.auth_service().login(&req.username, &req.password).await? {
        LoginOutcome::Authenticated(user) => {
            establish_session(&session, &user).await?;
            Ok(Json(SessionResponse::for_user("Login successful", &user)).into_response())
        }
        LoginOutcome::OtpRequired { user_id, delivery } => Ok(Json(ChallengeResponse::pending(
            user_id,
            &delivery,
            "Verification code sent to your email",
        ))
        .into_response()),
    }
}

/// `POST /api/auth/verify-2fa`
pub async fn verify_2fa(
    State(state): State<AppState>,
    session: Session,
    payload: std::result::Result<Json<VerifyOtpRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>> {
    let Json(req) = payload?;
    let user = state.auth_service().verify_otp(req.user_id, &req.otp).await?;
    establish_session(&session, &user).await?;
    Ok(Json(SessionResponse::for_user("Login successful", &user)))
}

/// `POST /api/auth/otp/request`
///
/// The code is only ever emailed; a passwordless request never returns it.
pub async fn request_login_otp(
    State(state): State<AppState>,
    payload: std::result::Result<Json<OtpRequest>, JsonRejection>,
) -> Result<Json<OtpSentResponse>> {
    let Json(req) = payload?;
    let email_sent = state.auth_service().request_login_otp(&req.email).await?;
    Ok(Json(OtpSentResponse {
        message: "OTP sent successfully",
        email_sent,
    }))
}

/// `POST /api/auth/otp/verify`
pub async fn verify_login_otp(
    State(state): State<AppState>,
    session: Session,
    payload: std::result::Result<Json<OtpLoginRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>> {
    let Json(req) = payload?;
    let user = state
        .auth_service()
        .verify_login_otp(&req.email, &req.otp)
        .await?;
    establish_session(&session, &user).await?;
    Ok(Json(SessionResponse::for_user("Login successful", &user)))
}

/// `GET /api/auth/status`
///
/// Flags come from the store, not the session.
pub async fn status(
    State(state): State<AppState>,
    OptionalAuth(current): OptionalAuth,
) -> Result<Json<StatusResponse>> {
    let user = match current {
        Some(current) => state.users().get_by_id(current.id).await?,
        None => None,
    };
    Ok(Json(StatusResponse {
        authenticated: user.is_some(),
        user: user.map(|u| StatusUser {
            username: u.username,
            display_name: u.display_name,
            email: u.email.map(String::from),
            is_admin: u.is_admin,
            is_admin_verified: u.is_admin_verified,
            is_verified: u.is_verified,
            must_change_password: u.must_change_password,
        }),
    }))
}

/// `POST /api/logout`
pub async fn logout(session: Session) -> Result<Json<MessageResponse>> {
    end_session(&session).await?;
    Ok(Json(MessageResponse {
        message: "Logged out successfully",
    }))
}

/// `POST /api/auth/change-password`
pub async fn change_password(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    payload: std::result::Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>> {
    let Json(req) = payload?;
    state
        .auth_service()
        .change_password(current.id, req.current_password.as_deref(), &req.new_password)
        .await?;
    Ok(Json(MessageResponse {
        message: "Password updated successfully",
    }))
}

/// `DELETE /api/account`
pub async fn delete_account(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(current): RequireAuth,
) -> Result<Json<MessageResponse>> {
    state.auth_service().delete_account(current.id).await?;
    end_session(&session).await?;
    Ok(Json(MessageResponse {
        message: "Account deleted successfully",
    }))
}
