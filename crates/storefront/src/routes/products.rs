//! Catalog route handlers.

use std::str::FromStr;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection, rejection::PathRejection},
    http::StatusCode,
    response::IntoResponse,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use modernshop_core::{Price, ProductId};

use crate::db::RepositoryError;
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::{NewProduct, Product, ProductUpdate, product::PLACEHOLDER_IMAGE_URL};
use crate::state::AppState;

/// Product body for create and update. Everything is optional so the same
/// shape serves both; create checks the required fields itself.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRequest {
    pub name: Option<String>,
    /// A JSON number or a decimal string.
    pub price: Option<serde_json::Value>,
    pub description: Option<String>,
    #[serde(alias = "imageUrl")]
    pub image: Option<String>,
    pub stock: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct StockRequest {
    pub stock: i32,
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub message: &'static str,
    pub product: Product,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

fn parse_price(value: &serde_json::Value) -> Result<Price> {
    let amount = match value {
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()),
        serde_json::Value::String(s) => Decimal::from_str(s.trim()),
        _ => return Err(AppError::BadRequest("price must be a number".to_owned())),
    }
    .map_err(|_| AppError::BadRequest("price must be a number".to_owned()))?;
    Price::new(amount).map_err(|e| AppError::BadRequest(e.to_string()))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn product_not_found(e: RepositoryError) -> AppError {
    match e {
        RepositoryError::NotFound => AppError::NotFound("Product not found".to_owned()),
        other => other.into(),
    }
}

/// `GET /api/products`
pub async fn index(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.products().list().await?))
}

/// `GET /api/products/{id}`
pub async fn show(
    State(state): State<AppState>,
    id: std::result::Result<Path<ProductId>, PathRejection>,
) -> Result<Json<Product>> {
    let Path(id) = id?;
    state
        .products()
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Product not found".to_owned()))
}

/// `POST /api/admin/products`
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    payload: std::result::Result<Json<ProductRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(req) = payload?;
    let name = non_blank(req.name)
        .ok_or_else(|| AppError::BadRequest("name is required".to_owned()))?;
    let price = parse_price(
        req.price
            .as_ref()
            .ok_or_else(|| AppError::BadRequest("price is required".to_owned()))?,
    )?;
    let stock = req.stock.unwrap_or(0);
    if stock < 0 {
        return Err(AppError::BadRequest("stock cannot be negative".to_owned()));
    }

    let product = state
        .products()
        .create(NewProduct {
            name,
            description: non_blank(req.description),
            image_url: non_blank(req.image).unwrap_or_else(|| PLACEHOLDER_IMAGE_URL.to_owned()),
            price,
            stock,
        })
        .await?;
    tracing::info!(product_id = %product.id, admin_id = %admin.id, "Product created");

    Ok((
        StatusCode::CREATED,
        Json(ProductResponse {
            message: "Product added successfully",
            product,
        }),
    ))
}

/// `PUT /api/admin/products/{id}`
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    id: std::result::Result<Path<ProductId>, PathRejection>,
    payload: std::result::Result<Json<ProductRequest>, JsonRejection>,
) -> Result<Json<ProductResponse>> {
    let Path(id) = id?;
    let Json(req) = payload?;
    let price = req.price.as_ref().map(parse_price).transpose()?;

    let product = state
        .products()
        .update(
            id,
            ProductUpdate {
                name: non_blank(req.name),
                description: req.description,
                image_url: non_blank(req.image),
                price,
            },
        )
        .await
        .map_err(product_not_found)?;
    tracing::info!(product_id = %product.id, "Product updated");

    Ok(Json(ProductResponse {
        message: "Product updated successfully",
        product,
    }))
}

/// `PATCH /api/admin/products/{id}/stock`
pub async fn set_stock(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    id: std::result::Result<Path<ProductId>, PathRejection>,
    payload: std::result::Result<Json<StockRequest>, JsonRejection>,
) -> Result<Json<ProductResponse>> {
    let Path(id) = id?;
    let Json(req) = payload?;
    if req.stock < 0 {
        return Err(AppError::BadRequest("stock cannot be negative".to_owned()));
    }

    let product = state
        .products()
        .set_stock(id, req.stock)
        .await
        .map_err(product_not_found)?;
    tracing::info!(product_id = %product.id, stock = product.stock, "Stock updated");

    Ok(Json(ProductResponse {
        message: "Stock updated successfully",
        product,
    }))
}

/// `DELETE /api/admin/products/{id}`
pub async fn delete(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    id: std::result::Result<Path<ProductId>, PathRejection>,
) -> Result<Json<MessageResponse>> {
    let Path(id) = id?;
    state
        .products()
        .delete(id)
        .await
        .map_err(product_not_found)?;
    tracing::info!(product_id = %id, "Product deleted");

    Ok(Json(MessageResponse {
        message: "Product deleted successfully",
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_price_accepts_numbers_and_strings() {
        assert_eq!(parse_price(&json!(19.99)).unwrap().display(), "$19.99");
        assert_eq!(parse_price(&json!("5")).unwrap().display(), "$5.00");
        assert!(parse_price(&json!(-1)).is_err());
        assert!(parse_price(&json!("abc")).is_err());
        assert!(parse_price(&json!(true)).is_err());
    }
}
