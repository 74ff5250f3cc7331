//! In-memory store implementing all three repository traits.
//!
//! Mirrors the Postgres constraints that handlers rely on: unique usernames,
//! emails and Google IDs, one live order per user and product, and stock
//! that never goes negative.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use modernshop_core::{Email, OrderId, OrderStatus, ProductId, UserId};

use super::{OrderStore, PlaceOrder, ProductStore, RepositoryError, UserStore};
use crate::models::{NewProduct, NewUser, Order, Product, ProductUpdate, User, UserUpdate};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    products: Vec<Product>,
    orders: Vec<StoredOrder>,
    next_user: i32,
    next_product: i32,
    next_order: i32,
}

#[derive(Clone)]
struct StoredOrder {
    id: OrderId,
    user_id: UserId,
    product_id: Option<ProductId>,
    product_name: String,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Tables {
    fn user_mut(&mut self, id: UserId) -> Result<&mut User, RepositoryError> {
        self.users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(RepositoryError::NotFound)
    }

    fn product_mut(&mut self, id: ProductId) -> Option<&mut Product> {
        self.products.iter_mut().find(|p| p.id == id)
    }

    fn order_view(&self, order: &StoredOrder) -> Result<Order, RepositoryError> {
        let username = self
            .users
            .iter()
            .find(|u| u.id == order.user_id)
            .map(|u| u.username.clone())
            .ok_or_else(|| {
                RepositoryError::DataCorruption(format!("order {} has no buyer", order.id))
            })?;
        Ok(Order {
            id: order.id,
            user_id: order.user_id,
            username,
            product_id: order.product_id,
            product_name: order.product_name.clone(),
            status: order.status,
            created_at: order.created_at,
            updated_at: order.updated_at,
        })
    }

    fn check_unique(&self, user: &NewUser, skip: Option<UserId>) -> Result<(), RepositoryError> {
        for other in self.users.iter().filter(|u| Some(u.id) != skip) {
            if other.username == user.username {
                return Err(RepositoryError::Conflict("username already exists".to_owned()));
            }
            if user.email.is_some() && other.email == user.email {
                return Err(RepositoryError::Conflict("email already exists".to_owned()));
            }
            if user.google_id.is_some() && other.google_id == user.google_id {
                return Err(RepositoryError::Conflict(
                    "google account already linked".to_owned(),
                ));
            }
        }
        Ok(())
    }
}

/// Thread-safe store for tests and local experiments.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move a user's last login into the past.
    pub fn backdate_login(&self, id: UserId, by: TimeDelta) {
        if let Ok(user) = self.lock().user_mut(id) {
            user.last_login_at = user.last_login_at.map(|at| at - by);
        }
    }

    /// Make any pending OTP for a user already expired.
    pub fn expire_otp(&self, id: UserId) {
        if let Ok(user) = self.lock().user_mut(id)
            && user.otp_expires_at.is_some()
        {
            user.otp_expires_at = Some(Utc::now() - TimeDelta::seconds(1));
        }
    }

    /// Current stock of a product, if it exists.
    #[must_use]
    pub fn stock_of(&self, id: ProductId) -> Option<i32> {
        self.lock()
            .products
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.stock)
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut tables = self.lock();
        tables.check_unique(&user, None)?;

        tables.next_user += 1;
        let now = Utc::now();
        let created = User {
            id: UserId::new(tables.next_user),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            google_id: user.google_id,
            display_name: user.display_name,
            phone: user.phone,
            is_verified: user.is_verified,
            is_admin_verified: user.is_admin_verified,
            is_admin: user.is_admin,
            must_change_password: user.must_change_password,
            otp_code: user.otp_code,
            otp_expires_at: user.otp_expires_at,
            last_login_at: user.last_login_at,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|u| u.username == *username)
            .cloned())
    }

    async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|u| u.email.as_ref() == Some(email))
            .cloned())
    }

    async fn get_by_google_id(&self, google_id: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|u| u.google_id.as_deref() == Some(google_id))
            .cloned())
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        Ok(self.lock().users.clone())
    }

    async fn set_otp(
        &self,
        id: UserId,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        let user = tables.user_mut(id)?;
        user.otp_code = Some(code.to_owned());
        user.otp_expires_at = Some(expires_at);
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn consume_otp(
        &self,
        id: UserId,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, RepositoryError> {
        let mut tables = self.lock();
        let Ok(user) = tables.user_mut(id) else {
            return Ok(None);
        };
        let matches = user.otp_code.as_deref() == Some(code)
            && user.otp_expires_at.is_some_and(|exp| exp > now);
        if !matches {
            return Ok(None);
        }
        user.otp_code = None;
        user.otp_expires_at = None;
        user.last_login_at = Some(now);
        user.is_verified = true;
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn record_login(
        &self,
        id: UserId,
        at: DateTime<Utc>,
        mark_verified: bool,
    ) -> Result<User, RepositoryError> {
        let mut tables = self.lock();
        let user = tables.user_mut(id)?;
        user.last_login_at = Some(at);
        user.is_verified |= mark_verified;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn set_password(&self, id: UserId, password_hash: &str) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        let user = tables.user_mut(id)?;
        user.password_hash = Some(password_hash.to_owned());
        user.must_change_password = false;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn set_admin_verification(
        &self,
        id: UserId,
        verified: bool,
    ) -> Result<User, RepositoryError> {
        let mut tables = self.lock();
        let user = tables.user_mut(id)?;
        user.is_admin_verified = verified;
        user.is_verified = verified;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn update(&self, id: UserId, update: UserUpdate) -> Result<User, RepositoryError> {
        let mut tables = self.lock();
        if let Some(email) = &update.email
            && tables
                .users
                .iter()
                .any(|u| u.id != id && u.email.as_ref() == Some(email))
        {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        let user = tables.user_mut(id)?;
        if let Some(email) = update.email {
            user.email = Some(email);
        }
        if let Some(verified) = update.is_verified {
            user.is_verified = verified;
        }
        if let Some(admin) = update.is_admin {
            user.is_admin = admin;
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn delete_with_orders(&self, ids: &[UserId]) -> Result<u64, RepositoryError> {
        let mut tables = self.lock();

        let released: Vec<ProductId> = tables
            .orders
            .iter()
            .filter(|o| ids.contains(&o.user_id) && o.status.holds_stock())
            .filter_map(|o| o.product_id)
            .collect();
        for product_id in released {
            if let Some(product) = tables.product_mut(product_id) {
                product.stock += 1;
            }
        }

        tables.orders.retain(|o| !ids.contains(&o.user_id));
        let before = tables.users.len();
        tables.users.retain(|u| !ids.contains(&u.id));
        Ok(u64::try_from(before - tables.users.len()).unwrap_or(u64::MAX))
    }
}

#[async_trait]
impl ProductStore for InMemoryStore {
    async fn list(&self) -> Result<Vec<Product>, RepositoryError> {
        Ok(self.lock().products.clone())
    }

    async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.lock().products.iter().find(|p| p.id == id).cloned())
    }

    async fn create(&self, product: NewProduct) -> Result<Product, RepositoryError> {
        let mut tables = self.lock();
        tables.next_product += 1;
        let created = Product {
            id: ProductId::new(tables.next_product),
            name: product.name,
            description: product.description,
            image_url: product.image_url,
            price: product.price,
            stock: product.stock,
            created_at: Utc::now(),
        };
        tables.products.push(created.clone());
        Ok(created)
    }

    async fn update(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product, RepositoryError> {
        let mut tables = self.lock();
        let product = tables.product_mut(id).ok_or(RepositoryError::NotFound)?;
        if let Some(name) = update.name {
            product.name = name;
        }
        if let Some(description) = update.description {
            product.description = Some(description);
        }
        if let Some(image_url) = update.image_url {
            product.image_url = image_url;
        }
        if let Some(price) = update.price {
            product.price = price;
        }
        Ok(product.clone())
    }

    async fn set_stock(&self, id: ProductId, stock: i32) -> Result<Product, RepositoryError> {
        if stock < 0 {
            return Err(RepositoryError::DataCorruption(format!(
                "negative stock {stock} for product {id}"
            )));
        }
        let mut tables = self.lock();
        let product = tables.product_mut(id).ok_or(RepositoryError::NotFound)?;
        product.stock = stock;
        Ok(product.clone())
    }

    async fn delete(&self, id: ProductId) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        let before = tables.products.len();
        tables.products.retain(|p| p.id != id);
        if tables.products.len() == before {
            return Err(RepositoryError::NotFound);
        }
        for order in tables.orders.iter_mut().filter(|o| o.product_id == Some(id)) {
            order.product_id = None;
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn place(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<PlaceOrder, RepositoryError> {
        let mut tables = self.lock();

        if tables.orders.iter().any(|o| {
            o.user_id == user_id
                && o.product_id == Some(product_id)
                && o.status != OrderStatus::Cancelled
        }) {
            return Ok(PlaceOrder::AlreadyOrdered);
        }

        let Some(product) = tables.product_mut(product_id) else {
            return Ok(PlaceOrder::ProductNotFound);
        };
        if product.stock <= 0 {
            return Ok(PlaceOrder::OutOfStock);
        }
        product.stock -= 1;
        let product_name = product.name.clone();

        tables.next_order += 1;
        let now = Utc::now();
        let stored = StoredOrder {
            id: OrderId::new(tables.next_order),
            user_id,
            product_id: Some(product_id),
            product_name,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        let view = tables.order_view(&stored)?;
        tables.orders.push(stored);
        Ok(PlaceOrder::Placed(view))
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let tables = self.lock();
        tables
            .orders
            .iter()
            .find(|o| o.id == id)
            .map(|o| tables.order_view(o))
            .transpose()
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let tables = self.lock();
        tables
            .orders
            .iter()
            .rev()
            .filter(|o| o.user_id == user_id)
            .map(|o| tables.order_view(o))
            .collect()
    }

    async fn list_all(&self) -> Result<Vec<Order>, RepositoryError> {
        let tables = self.lock();
        tables
            .orders
            .iter()
            .rev()
            .map(|o| tables.order_view(o))
            .collect()
    }

    async fn confirm(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let mut tables = self.lock();
        let Some(order) = tables
            .orders
            .iter_mut()
            .find(|o| o.id == id && o.status == OrderStatus::Pending)
        else {
            return Ok(None);
        };
        order.status = OrderStatus::Confirmed;
        order.updated_at = Utc::now();
        let snapshot = order.clone();
        tables.order_view(&snapshot).map(Some)
    }

    async fn cancel(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let mut tables = self.lock();
        let Some(order) = tables
            .orders
            .iter_mut()
            .find(|o| o.id == id && o.status.holds_stock())
        else {
            return Ok(None);
        };
        order.status = OrderStatus::Cancelled;
        order.updated_at = Utc::now();
        let snapshot = order.clone();

        if let Some(product_id) = snapshot.product_id
            && let Some(product) = tables.product_mut(product_id)
        {
            product.stock += 1;
        }
        tables.order_view(&snapshot).map(Some)
    }
}
