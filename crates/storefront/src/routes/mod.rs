//! HTTP route handlers for the shop API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                          - Liveness
//! GET  /health/ready                    - Readiness (user store ping)
//!
//! # Credentials (rate limited)
//! POST /api/signup                      - Create account
//! POST /api/login                       - Password login, code when stale
//! POST /api/auth/verify-2fa             - Finish a code challenge
//! POST /api/auth/otp/request            - Passwordless: email a code
//! POST /api/auth/otp/verify             - Passwordless: sign in with it
//! POST /api/auth/google/verify-otp      - Google: check the emailed code
//! POST /api/auth/google/complete        - Google: pick a username
//!
//! # Session
//! GET  /api/auth/status                 - Who am I
//! POST /api/logout                      - Sign out
//! POST /api/auth/change-password        - Change password
//! DELETE /api/account                   - Delete own account
//!
//! # Google
//! GET  /auth/google                     - Redirect to Google
//! GET  /auth/google/callback            - Google redirect target
//! GET  /api/auth/google/session-info    - Pending challenge state
//! GET  /api/auth/google/profile         - Username suggestion
//!
//! # Catalog
//! GET  /api/products                    - List products
//! GET  /api/products/{id}               - One product
//!
//! # Orders (requires auth)
//! POST /api/purchase                    - Buy a product
//! GET  /api/orders                      - Own orders
//! POST /api/orders/{id}/confirm         - Confirm a pending order
//! DELETE /api/orders/{id}               - Cancel an order
//!
//! # Admin (requires verified admin)
//! POST /api/admin/products              - Create product
//! PUT|DELETE /api/admin/products/{id}   - Edit or remove product
//! PATCH /api/admin/products/{id}/stock  - Set stock
//! GET  /api/admin/users                 - List users
//! PUT  /api/admin/users/{id}            - Edit user
//! POST /api/admin/verify-user           - Grant or revoke verification
//! POST /api/admin/users/bulk-delete     - Delete users
//! POST /api/admin/bulk-upload           - Provision users by email
//! GET  /api/admin/orders                - All orders
//! GET  /api/admin/report                - Orders CSV
//! ```

pub mod admin;
pub mod auth;
pub mod google;
pub mod orders;
pub mod products;

use std::time::Duration;

use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::{from_fn, map_response},
    response::Response,
    routing::{get, patch, post, put},
};
use tower_http::trace::TraceLayer;
use tower_sessions::{SessionManagerLayer, SessionStore, service::SignedCookie};
use tracing::{Span, field::Empty};

use crate::middleware::{
    auth_rate_limiter, json_rate_limit_rejection, request_id_middleware,
    security_headers_middleware,
};
use crate::state::AppState;

/// Signup, login and every code check. These share one per-IP limiter.
pub fn credential_routes() -> Router<AppState> {
    Router::new()
        .route("/api/signup", post(auth::signup))
        .route("/api/login", post(auth::login))
        .route("/api/auth/verify-2fa", post(auth::verify_2fa))
        .route("/api/auth/otp/request", post(auth::request_login_otp))
        .route("/api/auth/otp/verify", post(auth::verify_login_otp))
        .route("/api/auth/google/verify-otp", post(google::verify_otp))
        .route("/api/auth/google/complete", post(google::complete))
        .layer(auth_rate_limiter())
        .layer(map_response(json_rate_limit_rejection))
}

/// Session, Google redirect and account routes.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/status", get(auth::status))
        .route("/api/logout", post(auth::logout))
        .route("/api/auth/change-password", post(auth::change_password))
        .route("/api/account", axum::routing::delete(auth::delete_account))
        .route("/auth/google", get(google::start))
        .route("/auth/google/callback", get(google::callback))
        .route("/api/auth/google/session-info", get(google::session_info))
        .route("/api/auth/google/profile", get(google::profile_hint))
}

/// Catalog and order routes.
pub fn shop_routes() -> Router<AppState> {
    Router::new()
        .route("/api/products", get(products::index))
        .route("/api/products/{id}", get(products::show))
        .route("/api/purchase", post(orders::purchase))
        .route("/api/orders", get(orders::index))
        .route("/api/orders/{id}", axum::routing::delete(orders::cancel))
        .route("/api/orders/{id}/confirm", post(orders::confirm))
}

/// Admin routes. Each handler enforces the admin gate itself.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/products", post(products::create))
        .route(
            "/products/{id}",
            put(products::update).delete(products::delete),
        )
        .route("/products/{id}/stock", patch(products::set_stock))
        .route("/users", get(admin::users))
        .route("/users/{id}", put(admin::update_user))
        .route("/users/bulk-delete", post(admin::bulk_delete))
        .route("/verify-user", post(admin::verify_user))
        .route("/bulk-upload", post(admin::bulk_upload))
        .route("/orders", get(admin::orders))
        .route("/report", get(admin::report))
}

/// Create all API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(credential_routes())
        .merge(account_routes())
        .merge(shop_routes())
        .nest("/api/admin", admin_routes())
}

/// Build the complete application around a session store.
///
/// Layer order, outermost first: security headers, trace span, request ID,
/// sessions.
pub fn app<S>(state: AppState, session_layer: SessionManagerLayer<S, SignedCookie>) -> Router
where
    S: SessionStore + Clone,
{
    routes()
        .layer(session_layer)
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = Empty,
                        status = Empty,
                        latency_ms = Empty,
                    )
                })
                .on_response(|response: &Response, latency: Duration, span: &Span| {
                    span.record("status", response.status().as_u16());
                    span.record("latency_ms", latency.as_millis());
                    tracing::debug!("response sent");
                }),
        )
        .layer(from_fn(security_headers_middleware))
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the user store does not answer.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.users().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
