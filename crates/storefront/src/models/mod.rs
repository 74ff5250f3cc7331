//! Domain models for the shop.
//!
//! Row types double as domain types: each derives `sqlx::FromRow` for the
//! Postgres repositories and is built by hand in the in-memory store.
//! Anything sent to clients goes through a dedicated serializable view so
//! password hashes and OTP codes never leave the server.

pub mod order;
pub mod product;
pub mod session;
pub mod user;

pub use order::Order;
pub use product::{NewProduct, Product, ProductUpdate};
pub use session::{CurrentUser, GoogleAuthChallenge, GoogleProfile, keys as session_keys};
pub use user::{Capabilities, NewUser, PublicUser, User, UserUpdate};
