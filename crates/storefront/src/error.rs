//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server-side errors to
//! Sentry before responding to the client. All route handlers return
//! `Result<T, AppError>`, and every failure is sent as `{"error": "..."}`.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::admin::AdminError;
use crate::services::auth::AuthError;
use crate::services::orders::OrderError;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Admin error: {0}")]
    Admin(#[from] AdminError),

    /// Session store failure.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Auth(err) => auth_status(err),
            Self::Order(err) => match err {
                OrderError::Denied(_) | OrderError::WrongBuyer | OrderError::NotOwner => {
                    StatusCode::FORBIDDEN
                }
                OrderError::ProductNotFound | OrderError::OrderNotFound => StatusCode::NOT_FOUND,
                OrderError::OutOfStock => StatusCode::BAD_REQUEST,
                OrderError::AlreadyOrdered | OrderError::NotPending(_) => StatusCode::CONFLICT,
                OrderError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Admin(err) => match err {
                AdminError::UserNotFound => StatusCode::NOT_FOUND,
                AdminError::ProtectedAccount => StatusCode::FORBIDDEN,
                AdminError::NothingSelected => StatusCode::BAD_REQUEST,
                AdminError::Conflict(_) => StatusCode::CONFLICT,
                AdminError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Client-facing message. Internal details never leave the server.
    fn public_message(&self) -> String {
        if self.status().is_server_error() {
            return match self {
                Self::Auth(AuthError::OAuth(_)) => "Identity provider error".to_owned(),
                _ => "Internal server error".to_owned(),
            };
        }
        match self {
            Self::Auth(err) => match err {
                AuthError::InvalidEmail(_) => "Invalid email address".to_owned(),
                AuthError::InvalidUsername(e) => e.to_string(),
                AuthError::InvalidCredentials => "Invalid credentials".to_owned(),
                AuthError::WeakPassword(msg) => msg.clone(),
                other => other.to_string(),
            },
            Self::Order(err) => err.to_string(),
            Self::Admin(err) => err.to_string(),
            Self::NotFound(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg) => msg.clone(),
            Self::RateLimited => "Too many requests, please slow down".to_owned(),
            _ => self.to_string(),
        }
    }
}

const fn auth_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidEmail(_)
        | AuthError::InvalidUsername(_)
        | AuthError::MissingField(_)
        | AuthError::WeakPassword(_)
        | AuthError::Otp(_)
        | AuthError::OAuthSessionMissing
        | AuthError::OAuthEmailMissing => StatusCode::BAD_REQUEST,
        AuthError::InvalidCredentials | AuthError::PasswordNotSet => StatusCode::UNAUTHORIZED,
        AuthError::OtpNotVerified => StatusCode::FORBIDDEN,
        AuthError::UserNotFound => StatusCode::NOT_FOUND,
        AuthError::Conflict(_) => StatusCode::CONFLICT,
        AuthError::OAuth(_) => StatusCode::BAD_GATEWAY,
        AuthError::Repository(_) | AuthError::PasswordHash => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, username: &str) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            username: Some(username.to_owned()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// ```rust,ignore
/// add_breadcrumb("order", "Purchase", Some(&[("product_id", "3")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;

    use modernshop_core::OrderStatus;

    use super::*;
    use crate::services::auth::{DenyReason, OtpError};

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    async fn body_of(err: AppError) -> serde_json::Value {
        let bytes = to_bytes(err.into_response().into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product-123".to_string());
        assert_eq!(err.to_string(), "Not found: product-123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::RateLimited),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(AuthError::UserNotFound.into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AuthError::Conflict("taken".to_owned()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AuthError::Otp(OtpError::Expired).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AuthError::OtpNotVerified.into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(OrderError::Denied(DenyReason::PendingVerification).into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(OrderError::OutOfStock.into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(OrderError::NotPending(OrderStatus::Cancelled).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AdminError::ProtectedAccount.into()),
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn test_error_body_is_json() {
        let body = body_of(AuthError::Otp(OtpError::Mismatch).into()).await;
        assert_eq!(body["error"], "Invalid OTP");

        let body = body_of(OrderError::OutOfStock.into()).await;
        assert_eq!(body["error"], "Product unavailable");
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let err = AppError::Database(RepositoryError::DataCorruption("bad row 7".to_owned()));
        let body = body_of(err).await;
        assert_eq!(body["error"], "Internal server error");
    }
}
