//! Admin route handlers.
//!
//! Every handler takes [`RequireAdmin`], so the caller is a current admin
//! before any body is read.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection, rejection::PathRejection},
    http::header,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use modernshop_core::{Email, UserId};

use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::RequireAdmin;
use crate::models::{Order, PublicUser, UserUpdate};
use crate::services::admin::ProvisionReport;
use crate::services::orders::report_csv;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub is_verified: Option<bool>,
    pub is_admin: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyUserRequest {
    pub user_id: UserId,
    pub verify: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeleteRequest {
    #[serde(default)]
    pub user_ids: Vec<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct BulkUploadRequest {
    #[serde(default)]
    pub emails: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub users: Vec<PublicUser>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub message: &'static str,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyUserResponse {
    pub message: &'static str,
    pub is_admin_verified: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeleteResponse {
    pub message: String,
    pub deleted_count: u64,
}

#[derive(Debug, Serialize)]
pub struct BulkUploadResponse {
    pub message: &'static str,
    pub results: ProvisionReport,
}

#[derive(Debug, Serialize)]
pub struct OrdersResponse {
    pub orders: Vec<Order>,
}

/// `GET /api/admin/users`
pub async fn users(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<UsersResponse>> {
    let users = state.users().list().await?;
    Ok(Json(UsersResponse {
        users: users.iter().map(PublicUser::from).collect(),
    }))
}

/// `PUT /api/admin/users/{id}`
pub async fn update_user(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    id: std::result::Result<Path<UserId>, PathRejection>,
    payload: std::result::Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<UserResponse>> {
    let Path(id) = id?;
    let Json(req) = payload?;
    let email = req
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(Email::parse)
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let user = state
        .admin_service()
        .update_user(
            id,
            UserUpdate {
                email,
                is_verified: req.is_verified,
                is_admin: req.is_admin,
            },
        )
        .await?;
    tracing::info!(user_id = %id, admin_id = %admin.id, "User updated by admin");

    Ok(Json(UserResponse {
        message: "User updated successfully",
        user: PublicUser::from(&user),
    }))
}

/// `POST /api/admin/verify-user`
pub async fn verify_user(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    payload: std::result::Result<Json<VerifyUserRequest>, JsonRejection>,
) -> Result<Json<VerifyUserResponse>> {
    let Json(req) = payload?;
    let user = state
        .admin_service()
        .set_verification(req.user_id, req.verify)
        .await?;
    tracing::info!(
        user_id = %user.id,
        verified = req.verify,
        admin_id = %admin.id,
        "Admin verification changed"
    );

    Ok(Json(VerifyUserResponse {
        message: if req.verify {
            "User verified successfully"
        } else {
            "User verification revoked"
        },
        is_admin_verified: user.is_admin_verified,
    }))
}

/// `POST /api/admin/users/bulk-delete`
pub async fn bulk_delete(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    payload: std::result::Result<Json<BulkDeleteRequest>, JsonRejection>,
) -> Result<Json<BulkDeleteResponse>> {
    let Json(req) = payload?;
    add_breadcrumb(
        "admin",
        "Bulk delete",
        Some(&[("count", req.user_ids.len().to_string().as_str())]),
    );

    let deleted_count = state.admin_service().bulk_delete(&req.user_ids).await?;
    tracing::info!(deleted_count, admin_id = %admin.id, "Users deleted");

    Ok(Json(BulkDeleteResponse {
        message: format!("Successfully deleted {deleted_count} user(s)"),
        deleted_count,
    }))
}

/// `POST /api/admin/bulk-upload`
///
/// Each address is handled on its own; one bad row never aborts the batch.
pub async fn bulk_upload(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    payload: std::result::Result<Json<BulkUploadRequest>, JsonRejection>,
) -> Result<Json<BulkUploadResponse>> {
    let Json(req) = payload?;
    if req.emails.is_empty() {
        return Err(AppError::BadRequest("No emails provided".to_owned()));
    }

    let login_url = format!("{}/login.html", state.config().base_url.trim_end_matches('/'));
    let results = state
        .admin_service()
        .provision(&req.emails, &login_url)
        .await;
    tracing::info!(
        created = results.success.len(),
        failed = results.failed.len(),
        admin_id = %admin.id,
        "Bulk upload finished"
    );

    Ok(Json(BulkUploadResponse {
        message: "Bulk upload completed",
        results,
    }))
}

/// `GET /api/admin/orders`
pub async fn orders(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<OrdersResponse>> {
    Ok(Json(OrdersResponse {
        orders: state.orders().list_all().await?,
    }))
}

/// `GET /api/admin/report`
///
/// CSV of every order that was not cancelled.
pub async fn report(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<impl IntoResponse> {
    let orders = state.orders().list_all().await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"orders_report.csv\"",
            ),
        ],
        report_csv(&orders),
    ))
}
