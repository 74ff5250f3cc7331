//! Purchases and order lifecycle.
//!
//! Stock and order rows change together inside the store, so this layer
//! only applies the purchase policy and decides who may touch an order.

use thiserror::Error;

use modernshop_core::{OrderId, OrderStatus, ProductId};

use crate::db::{OrderStore, PlaceOrder, RepositoryError, UserStore};
use crate::models::{Order, User};
use crate::services::auth::{Action, Decision, DenyReason, authorize};
use crate::services::email::{self, Mailer};

/// Errors from order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The buyer may not purchase.
    #[error("{}", .0.message())]
    Denied(DenyReason),

    /// The request names a different buyer than the session.
    #[error("Cannot purchase on behalf of another user")]
    WrongBuyer,

    /// Neither the owner nor an admin.
    #[error("Not allowed to modify this order")]
    NotOwner,

    #[error("Product not found")]
    ProductNotFound,

    #[error("Product unavailable")]
    OutOfStock,

    #[error("You have already ordered this product")]
    AlreadyOrdered,

    #[error("Order not found")]
    OrderNotFound,

    /// The order is past the requested transition.
    #[error("Order is already {0}")]
    NotPending(OrderStatus),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Outcome of a confirmation.
#[derive(Debug)]
pub struct Confirmation {
    pub order: Order,
    /// False when the order is confirmed but the email did not go out.
    pub email_sent: bool,
}

/// Order service.
pub struct OrderService<'a> {
    orders: &'a dyn OrderStore,
    users: &'a dyn UserStore,
    mailer: Option<&'a dyn Mailer>,
}

impl<'a> OrderService<'a> {
    #[must_use]
    pub const fn new(
        orders: &'a dyn OrderStore,
        users: &'a dyn UserStore,
        mailer: Option<&'a dyn Mailer>,
    ) -> Self {
        Self {
            orders,
            users,
            mailer,
        }
    }

    /// Buy one unit of a product.
    ///
    /// `claimed_buyer` is the username sent in the request body, if any; it
    /// must match the signed-in user.
    ///
    /// # Errors
    ///
    /// `WrongBuyer`, `Denied`, `ProductNotFound`, `OutOfStock` or
    /// `AlreadyOrdered`.
    pub async fn purchase(
        &self,
        buyer: &User,
        product_id: ProductId,
        claimed_buyer: Option<&str>,
    ) -> Result<Order, OrderError> {
        if let Some(claimed) = claimed_buyer.map(str::trim).filter(|c| !c.is_empty())
            && claimed != buyer.username.as_str()
        {
            return Err(OrderError::WrongBuyer);
        }
        if let Decision::Deny(reason) = authorize(buyer.capabilities(), Action::Purchase) {
            return Err(OrderError::Denied(reason));
        }

        match self.orders.place(buyer.id, product_id).await? {
            PlaceOrder::Placed(order) => {
                tracing::info!(
                    order_id = %order.id,
                    user_id = %buyer.id,
                    product_id = %product_id,
                    "Order placed"
                );
                Ok(order)
            }
            PlaceOrder::ProductNotFound => Err(OrderError::ProductNotFound),
            PlaceOrder::OutOfStock => Err(OrderError::OutOfStock),
            PlaceOrder::AlreadyOrdered => Err(OrderError::AlreadyOrdered),
        }
    }

    /// Confirm a pending order and email the buyer.
    ///
    /// # Errors
    ///
    /// `OrderNotFound`, `NotOwner`, or `NotPending`.
    pub async fn confirm(&self, actor: &User, id: OrderId) -> Result<Confirmation, OrderError> {
        let order = self.owned_order(actor, id).await?;
        if !order.status.is_open() {
            return Err(OrderError::NotPending(order.status));
        }

        let order = match self.orders.confirm(id).await? {
            Some(order) => order,
            None => return Err(self.not_pending(id).await),
        };
        tracing::info!(order_id = %order.id, "Order confirmed");

        let email_sent = self.send_confirmation(&order).await;
        Ok(Confirmation { order, email_sent })
    }

    /// Cancel an order and return its unit of stock. Confirmed orders can
    /// be cancelled too.
    ///
    /// # Errors
    ///
    /// `OrderNotFound`, `NotOwner`, or `NotPending` once already cancelled.
    pub async fn cancel(&self, actor: &User, id: OrderId) -> Result<Order, OrderError> {
        let order = self.owned_order(actor, id).await?;
        if !order.status.holds_stock() {
            return Err(OrderError::NotPending(order.status));
        }

        match self.orders.cancel(id).await? {
            Some(order) => {
                tracing::info!(order_id = %order.id, "Order cancelled");
                Ok(order)
            }
            None => Err(self.not_pending(id).await),
        }
    }

    async fn owned_order(&self, actor: &User, id: OrderId) -> Result<Order, OrderError> {
        let order = self.orders.get(id).await?.ok_or(OrderError::OrderNotFound)?;
        if order.user_id != actor.id && !actor.is_admin {
            return Err(OrderError::NotOwner);
        }
        Ok(order)
    }

    /// Lost a race with another status change: report where it ended up.
    async fn not_pending(&self, id: OrderId) -> OrderError {
        match self.orders.get(id).await {
            Ok(Some(order)) => OrderError::NotPending(order.status),
            Ok(None) => OrderError::OrderNotFound,
            Err(e) => OrderError::Repository(e),
        }
    }

    async fn send_confirmation(&self, order: &Order) -> bool {
        let Some(mailer) = self.mailer else {
            return false;
        };
        let owner = match self.users.get_by_id(order.user_id).await {
            Ok(Some(owner)) => owner,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(order_id = %order.id, error = %e, "Could not load buyer for confirmation");
                return false;
            }
        };
        let Some(to) = owner.email.as_ref() else {
            return false;
        };

        let sent = match email::order_confirmation_email(
            to,
            owner.username.as_str(),
            &order.product_name,
            order.id,
        ) {
            Ok(message) => mailer.send(&message).await,
            Err(e) => Err(e),
        };
        match sent {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(order_id = %order.id, error = %e, "Failed to send order confirmation");
                false
            }
        }
    }
}

/// Render the sales report: one row per non-cancelled order.
#[must_use]
pub fn report_csv(orders: &[Order]) -> String {
    let mut csv = String::from("Product Name,Buyer Name\n");
    for order in orders.iter().filter(|o| o.status != OrderStatus::Cancelled) {
        csv.push_str(&csv_field(&order.product_name));
        csv.push(',');
        csv.push_str(&csv_field(order.username.as_str()));
        csv.push('\n');
    }
    csv
}

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}
