//! ModernShop Core - Shared domain types.
//!
//! This crate provides the types shared by every ModernShop component:
//! - `storefront` - The HTTP API (accounts, OTP sign-in, catalog, orders)
//! - `cli` - Command-line tools for migrations and user management
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no database
//! access, no HTTP clients. Database encoding is available behind the
//! `postgres` feature.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, email addresses, usernames, order status, prices

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
