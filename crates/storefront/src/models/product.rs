//! Catalog products.

use chrono::{DateTime, Utc};
use serde::Serialize;

use modernshop_core::{Price, ProductId};

/// Image shown when a product is created without one.
pub const PLACEHOLDER_IMAGE_URL: &str = "https://via.placeholder.com/500?text=No+Image";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "image")]
    pub image_url: String,
    pub price: Price,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub image_url: String,
    pub price: Price,
    pub stock: i32,
}

/// Partial edit of a product's descriptive fields.
///
/// Stock is adjusted separately so edits never race with purchases.
#[derive(Debug, Clone, Default)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub price: Option<Price>,
}
