//! Product repository for database operations.

use async_trait::async_trait;
use sqlx::PgPool;

use modernshop_core::ProductId;

use super::{ProductStore, RepositoryError};
use crate::models::{NewProduct, Product, ProductUpdate};

const PRODUCT_COLUMNS: &str = "id, name, description, image_url, price, stock, created_at";

/// Postgres-backed [`ProductStore`].
#[derive(Clone)]
pub struct ProductRepository {
    pool: PgPool,
}

impl ProductRepository {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductStore for ProductRepository {
    async fn list(&self) -> Result<Vec<Product>, RepositoryError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM shop.products ORDER BY id");
        let products = sqlx::query_as::<_, Product>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM shop.products WHERE id = $1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    async fn create(&self, product: NewProduct) -> Result<Product, RepositoryError> {
        let sql = format!(
            "INSERT INTO shop.products (name, description, image_url, price, stock) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {PRODUCT_COLUMNS}"
        );
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(&product.name)
            .bind(&product.description)
            .bind(&product.image_url)
            .bind(product.price)
            .bind(product.stock)
            .fetch_one(&self.pool)
            .await?;
        Ok(product)
    }

    async fn update(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product, RepositoryError> {
        let sql = format!(
            "UPDATE shop.products \
             SET name = COALESCE($2, name), \
                 description = COALESCE($3, description), \
                 image_url = COALESCE($4, image_url), \
                 price = COALESCE($5, price) \
             WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
        );
        sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .bind(&update.name)
            .bind(&update.description)
            .bind(&update.image_url)
            .bind(update.price)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    async fn set_stock(&self, id: ProductId, stock: i32) -> Result<Product, RepositoryError> {
        if stock < 0 {
            return Err(RepositoryError::DataCorruption(format!(
                "negative stock {stock} for product {id}"
            )));
        }
        let sql =
            format!("UPDATE shop.products SET stock = $2 WHERE id = $1 RETURNING {PRODUCT_COLUMNS}");
        sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .bind(stock)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    async fn delete(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
