//! Business logic services for the shop.
//!
//! # Services
//!
//! - `auth` - Sign-in flows (password, OTP, Google) and the purchase/admin policy
//! - `email` - Rendering and sending account and order emails
//! - `google` - Google OAuth client
//! - `orders` - Purchase, confirmation, cancellation, sales report
//! - `admin` - Account management and bulk provisioning
//!
//! Services borrow their stores from `AppState` for the duration of a
//! request and never touch the session.

pub mod admin;
pub mod auth;
pub mod email;
pub mod google;
pub mod orders;
