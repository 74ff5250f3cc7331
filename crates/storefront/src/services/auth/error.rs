//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::google::OAuthError;

use super::otp::OtpError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] modernshop_core::EmailError),

    /// Invalid username format.
    #[error("invalid username: {0}")]
    InvalidUsername(#[from] modernshop_core::UsernameError),

    /// A required request field is absent or blank.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// Wrong password.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The account has no password (Google-only).
    #[error("this account signs in with Google")]
    PasswordNotSet,

    /// User not found.
    #[error("user not found")]
    UserNotFound,

    /// Username or email already taken.
    #[error("{0}")]
    Conflict(String),

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// The supplied one-time code was rejected.
    #[error(transparent)]
    Otp(#[from] OtpError),

    /// No Google sign-in is in progress in this session.
    #[error("Session expired or invalid")]
    OAuthSessionMissing,

    /// Profile completion attempted before the code was verified.
    #[error("Session expired or OTP not verified")]
    OtpNotVerified,

    /// Google did not supply a usable email address.
    #[error("No email found in Google profile")]
    OAuthEmailMissing,

    /// The identity provider failed.
    #[error("identity provider error: {0}")]
    OAuth(#[from] OAuthError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
