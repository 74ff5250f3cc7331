//! Persistence for users, products and orders.
//!
//! # Database schema: `shop`
//!
//! - `users` - Accounts, credentials, verification flags, pending OTP
//! - `products` - Catalog with stock counts
//! - `orders` - Purchases (`pending` / `confirmed` / `cancelled`)
//! - `session` - tower-sessions storage shared by every instance
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p modernshop-cli -- migrate
//! ```
//!
//! Handlers talk to the `UserStore` / `ProductStore` / `OrderStore` traits.
//! The Postgres repositories implement them for production; the in-memory
//! store (feature `test-support`) implements them for tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use modernshop_core::{Email, OrderId, ProductId, UserId};

use crate::models::{NewProduct, NewUser, Order, Product, ProductUpdate, User, UserUpdate};

#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod orders;
pub mod products;
pub mod users;

pub use orders::OrderRepository;
pub use products::ProductRepository;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the store violates a domain invariant.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// The addressed row does not exist.
    #[error("not found")]
    NotFound,

    /// A unique constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Map a unique-violation into `Conflict`, naming the constraint.
pub(crate) fn map_unique_violation(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        let what = match db_err.constraint() {
            Some(c) if c.contains("username") => "username already exists",
            Some(c) if c.contains("email") => "email already exists",
            Some(c) if c.contains("google_id") => "google account already linked",
            Some(c) if c.contains("one_per_product") => "order already exists",
            _ => "duplicate value",
        };
        return RepositoryError::Conflict(what.to_owned());
    }
    RepositoryError::Database(e)
}

/// Result of an attempt to place an order.
#[derive(Debug, Clone)]
pub enum PlaceOrder {
    /// Stock was decremented and the order created.
    Placed(Order),
    ProductNotFound,
    OutOfStock,
    /// The user already holds a non-cancelled order for this product.
    AlreadyOrdered,
}

/// Account persistence.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Round-trip to the backing store (readiness probe).
    async fn ping(&self) -> Result<(), RepositoryError>;

    /// Insert a new account. `Conflict` on a duplicate username, email or
    /// Google ID.
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError>;

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError>;

    async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;

    async fn get_by_google_id(&self, google_id: &str) -> Result<Option<User>, RepositoryError>;

    /// All accounts ordered by ID.
    async fn list(&self) -> Result<Vec<User>, RepositoryError>;

    /// Store a fresh OTP challenge, replacing any previous one.
    async fn set_otp(
        &self,
        id: UserId,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Atomically consume a matching, unexpired OTP.
    ///
    /// On success the challenge is cleared, `last_login_at` becomes `now`
    /// and the account is marked verified. Returns `None` when no matching
    /// challenge is pending at `now`, which makes a replay fail.
    async fn consume_otp(
        &self,
        id: UserId,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, RepositoryError>;

    /// Stamp a successful login. `NotFound` if the user vanished.
    async fn record_login(
        &self,
        id: UserId,
        at: DateTime<Utc>,
        mark_verified: bool,
    ) -> Result<User, RepositoryError>;

    /// Replace the password hash and clear `must_change_password`.
    async fn set_password(&self, id: UserId, password_hash: &str) -> Result<(), RepositoryError>;

    /// Set `is_admin_verified` and cascade the same value to `is_verified`.
    async fn set_admin_verification(
        &self,
        id: UserId,
        verified: bool,
    ) -> Result<User, RepositoryError>;

    async fn update(&self, id: UserId, update: UserUpdate) -> Result<User, RepositoryError>;

    /// Delete accounts together with their orders.
    ///
    /// Stock held by every order that was not cancelled is returned to the
    /// products in the same transaction. Returns the number of accounts deleted.
    async fn delete_with_orders(&self, ids: &[UserId]) -> Result<u64, RepositoryError>;
}

/// Catalog persistence.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// All products ordered by ID.
    async fn list(&self) -> Result<Vec<Product>, RepositoryError>;

    async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    async fn create(&self, product: NewProduct) -> Result<Product, RepositoryError>;

    async fn update(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product, RepositoryError>;

    /// Overwrite the stock count. `NotFound` if missing.
    async fn set_stock(&self, id: ProductId, stock: i32) -> Result<Product, RepositoryError>;

    /// Remove a product. Existing orders keep their name snapshot.
    async fn delete(&self, id: ProductId) -> Result<(), RepositoryError>;
}

/// Order persistence.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Decrement stock only if positive and create a pending order, as one
    /// atomic step.
    async fn place(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<PlaceOrder, RepositoryError>;

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<Order>, RepositoryError>;

    /// Move a pending order to `confirmed`. `None` if it was not pending.
    async fn confirm(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Move a pending or confirmed order to `cancelled` and return its unit
    /// of stock. `None` if it was already cancelled.
    async fn cancel(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;
}

/// The three repositories the handlers need, behind trait objects.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub products: Arc<dyn ProductStore>,
    pub orders: Arc<dyn OrderStore>,
}

impl Stores {
    /// Postgres-backed repositories sharing one pool.
    #[must_use]
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            users: Arc::new(UserRepository::new(pool.clone())),
            products: Arc::new(ProductRepository::new(pool.clone())),
            orders: Arc::new(OrderRepository::new(pool.clone())),
        }
    }

    /// All three traits served by one in-memory store.
    #[cfg(any(test, feature = "test-support"))]
    #[must_use]
    pub fn in_memory(store: &Arc<memory::InMemoryStore>) -> Self {
        Self {
            users: store.clone(),
            products: store.clone(),
            orders: store.clone(),
        }
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
