//! Purchase orders.

use chrono::{DateTime, Utc};
use serde::Serialize;

use modernshop_core::{OrderId, OrderStatus, ProductId, UserId, Username};

/// An order joined with its buyer's username.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub username: Username,
    /// `None` once the product has been removed from the catalog.
    pub product_id: Option<ProductId>,
    /// Name at purchase time.
    pub product_name: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
