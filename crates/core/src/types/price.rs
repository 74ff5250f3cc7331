//! Non-negative product price in US dollars.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// Prices cannot be negative.
    #[error("price cannot be negative")]
    Negative,
    /// More than two decimal places.
    #[error("price must have at most two decimal places")]
    TooPrecise,
}

/// A catalog price, stored as `NUMERIC(10,2)`.
///
/// Serialized as a string (`"159.99"`) so clients never see float rounding.
///
/// ```
/// use modernshop_core::Price;
/// use rust_decimal::Decimal;
///
/// let price = Price::new(Decimal::new(15999, 2)).unwrap();
/// assert_eq!(price.display(), "$159.99");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(transparent))]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// A free item.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Validate and wrap an amount.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError`] for negative amounts or sub-cent precision.
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative);
        }
        if amount.normalize().scale() > 2 {
            return Err(PriceError::TooPrecise);
        }
        Ok(Self(amount))
    }

    /// The raw decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Format for display, e.g. `$19.99`.
    #[must_use]
    pub fn display(&self) -> String {
        format!("${:.2}", self.0)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}
