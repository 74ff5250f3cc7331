//! Order repository for database operations.
//!
//! Stock and orders move together: placing an order decrements stock in the
//! same transaction, cancelling a pending or confirmed order puts the unit back.

use async_trait::async_trait;
use sqlx::PgPool;

use modernshop_core::{OrderId, ProductId, UserId};

use super::{OrderStore, PlaceOrder, RepositoryError, map_unique_violation};
use crate::models::Order;

/// Orders joined with the buyer's username.
macro_rules! order_select {
    () => {
        "SELECT o.id, o.user_id, u.username, o.product_id, o.product_name, o.status, \
                o.created_at, o.updated_at \
         FROM shop.orders o JOIN shop.users u ON u.id = o.user_id "
    };
}

/// Postgres-backed [`OrderStore`].
#[derive(Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(concat!(order_select!(), "WHERE o.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn place(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<PlaceOrder, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(i32,)> = sqlx::query_as(
            "SELECT id FROM shop.orders \
             WHERE user_id = $1 AND product_id = $2 AND status <> 'cancelled'",
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?;
        if existing.is_some() {
            return Ok(PlaceOrder::AlreadyOrdered);
        }

        // Conditional decrement: the row lock serializes concurrent buyers.
        let reserved: Option<(String,)> = sqlx::query_as(
            "UPDATE shop.products SET stock = stock - 1 \
             WHERE id = $1 AND stock > 0 RETURNING name",
        )
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((product_name,)) = reserved else {
            let exists: Option<(i32,)> = sqlx::query_as("SELECT id FROM shop.products WHERE id = $1")
                .bind(product_id)
                .fetch_optional(&mut *tx)
                .await?;
            return Ok(if exists.is_some() {
                PlaceOrder::OutOfStock
            } else {
                PlaceOrder::ProductNotFound
            });
        };

        let inserted = sqlx::query_as::<_, (i32,)>(
            "INSERT INTO shop.orders (user_id, product_id, product_name) \
             VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(user_id)
        .bind(product_id)
        .bind(&product_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_unique_violation);

        let order_id = match inserted {
            Ok((id,)) => OrderId::new(id),
            // A concurrent purchase of the same product won the race.
            Err(RepositoryError::Conflict(_)) => return Ok(PlaceOrder::AlreadyOrdered),
            Err(e) => return Err(e),
        };

        let order = sqlx::query_as::<_, Order>(concat!(order_select!(), "WHERE o.id = $1"))
            .bind(order_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(PlaceOrder::Placed(order))
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        self.fetch(id).await
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let orders = sqlx::query_as::<_, Order>(concat!(
            order_select!(),
            "WHERE o.user_id = $1 ORDER BY o.created_at DESC, o.id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    async fn list_all(&self) -> Result<Vec<Order>, RepositoryError> {
        let orders = sqlx::query_as::<_, Order>(concat!(
            order_select!(),
            "ORDER BY o.created_at DESC, o.id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    async fn confirm(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let result = sqlx::query(
            "UPDATE shop.orders SET status = 'confirmed', updated_at = now() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.fetch(id).await
    }

    async fn cancel(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let cancelled: Option<(Option<ProductId>,)> = sqlx::query_as(
            "UPDATE shop.orders SET status = 'cancelled', updated_at = now() \
             WHERE id = $1 AND status <> 'cancelled' RETURNING product_id",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((product_id,)) = cancelled else {
            return Ok(None);
        };

        if let Some(product_id) = product_id {
            sqlx::query("UPDATE shop.products SET stock = stock + 1 WHERE id = $1")
                .bind(product_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        self.fetch(id).await
    }
}
