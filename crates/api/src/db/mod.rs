//! Database operations for the Tradepost `PostgreSQL` database.
//!
//! ## Tables (schema `shop`)
//!
//! - `user` - Accounts (password or Google sign-in) with a role
//! - `category`, `product`, `product_image`, `size`, `color`,
//!   `product_size`, `product_color` - Catalog
//! - `cart`, `cart_item`, `wishlist`, `wishlist_item` - Per-user baskets
//! - `shipping_address` - Delivery addresses
//! - `order`, `order_item` - Placed orders
//! - `payment_attempt` - Checkout state machine rows
//! - `outbox_event` - Side effects awaiting delivery
//! - `review` - Product reviews
//!
//! `user` and `order` are reserved words, so they are always schema-qualified.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p tradepost-cli -- migrate
//! ```

pub mod addresses;
pub mod analytics;
pub mod carts;
pub mod catalog;
pub mod categories;
pub mod orders;
pub mod outbox;
pub mod payments;
pub mod products;
pub mod reviews;
pub mod users;
pub mod wishlists;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use addresses::AddressRepository;
pub use analytics::AnalyticsRepository;
pub use carts::CartRepository;
pub use catalog::CatalogRepository;
pub use categories::CategoryRepository;
pub use orders::OrderRepository;
pub use outbox::OutboxRepository;
pub use payments::PaymentRepository;
pub use products::ProductRepository;
pub use reviews::ReviewRepository;
pub use users::UserRepository;
pub use wishlists::WishlistRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("{0}")]
    Conflict(String),

    /// Input referenced something that does not exist or broke a rule the
    /// client is responsible for.
    #[error("{0}")]
    Invalid(String),
}

impl RepositoryError {
    /// Map a unique violation to `Conflict(message)`, anything else to `Database`.
    pub(crate) fn on_unique(e: sqlx::Error, message: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return Self::Conflict(message.to_owned());
        }
        Self::Database(e)
    }

    /// Whether the underlying error is a foreign key violation.
    pub(crate) fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
        matches!(e, sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation())
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
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
