//! Purchase and order route handlers.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection, rejection::PathRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use modernshop_core::{OrderId, OrderStatus, ProductId};

use crate::error::{Result, add_breadcrumb};
use crate::middleware::RequireUser;
use crate::models::Order;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    /// Must match the signed-in user when present.
    pub username: Option<String>,
    pub product_id: ProductId,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub message: &'static str,
    pub order: Order,
}

#[derive(Debug, Serialize)]
pub struct OrdersResponse {
    pub orders: Vec<Order>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    pub message: &'static str,
    pub status: OrderStatus,
    pub email_sent: bool,
    pub order: Order,
}

/// `POST /api/purchase`
pub async fn purchase(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    payload: std::result::Result<Json<PurchaseRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(req) = payload?;
    add_breadcrumb(
        "order",
        "Purchase",
        Some(&[("product_id", req.product_id.to_string().as_str())]),
    );

    let order = state
        .order_service()
        .purchase(&user, req.product_id, req.username.as_deref())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(OrderResponse {
            message: "Purchase successful",
            order,
        }),
    ))
}

/// `GET /api/orders`
pub async fn index(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<OrdersResponse>> {
    let orders = state.orders().list_for_user(user.id).await?;
    Ok(Json(OrdersResponse { orders }))
}

/// `POST /api/orders/{id}/confirm`
///
/// The order stays confirmed even when the email fails; `emailSent` says
/// which happened.
pub async fn confirm(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    id: std::result::Result<Path<OrderId>, PathRejection>,
) -> Result<Json<ConfirmResponse>> {
    let Path(id) = id?;
    add_breadcrumb("order", "Confirm", Some(&[("order_id", id.to_string().as_str())]));

    let confirmation = state.order_service().confirm(&user, id).await?;
    Ok(Json(ConfirmResponse {
        message: if confirmation.email_sent {
            "Order confirmed and email sent"
        } else {
            "Order confirmed, but the confirmation email could not be sent"
        },
        status: confirmation.order.status,
        email_sent: confirmation.email_sent,
        order: confirmation.order,
    }))
}

/// `DELETE /api/orders/{id}`
pub async fn cancel(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    id: std::result::Result<Path<OrderId>, PathRejection>,
) -> Result<Json<OrderResponse>> {
    let Path(id) = id?;
    let order = state.order_service().cancel(&user, id).await?;
    Ok(Json(OrderResponse {
        message: "Order cancelled successfully",
        order,
    }))
}
