//! Domain models for the API.
//!
//! Row types derive `sqlx::FromRow` and serialize to camelCase JSON.

pub mod address;
pub mod cart;
pub mod catalog;
pub mod order;
pub mod outbox;
pub mod payment;
pub mod review;
pub mod session;
pub mod user;
pub mod wishlist;

pub use session::{CurrentUser, keys as session_keys};
pub use user::User;
