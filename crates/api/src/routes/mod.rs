//! HTTP route handlers for the API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                               - Liveness
//! GET  /health/ready                         - Readiness (database)
//!
//! Everything else is under /api/v2:
//!
//! # Auth (strict rate limit)
//! POST /auth/register | /auth/login | /auth/logout
//! GET  /auth/profile
//! GET  /auth/google | /auth/google/callback
//!
//! # Admin user management
//! POST /users              GET /users
//! GET|PATCH|DELETE /users/{id}
//! POST /users/{id}/assign-admin
//!
//! # Catalog
//! /categories, /categories/{id}
//! /products, /products/search, /products/new-arrivals, /products/low-stock
//! /products/sizes, /products/colors, /products/{id}
//!
//! # Shopping
//! /carts, /carts/add, /carts/item/{id}, /carts/total
//! /wishlists, /wishlists/add, /wishlists/{productId}
//! /shipping-addresses, /shipping-addresses/{id}
//! /reviews, /reviews/{id}
//!
//! # Orders and checkout
//! /orders, /orders/user/orders, /orders/{id}, /orders/{id}/status
//! POST /payments/initiate/{shippingAddressId}
//! GET  /payments/verify?reference=
//! POST /payments/webhook
//! GET  /payments/{reference}
//!
//! # Admin
//! /analytics/*
//! GET  /admin-alerts                         - Websocket
//! ```

pub mod addresses;
pub mod alerts;
pub mod analytics;
pub mod auth;
pub mod carts;
pub mod categories;
pub mod health;
pub mod orders;
pub mod payments;
pub mod products;
pub mod reviews;
pub mod users;
pub mod wishlists;

use axum::{Router, routing::get};

use crate::middleware::{api_rate_limiter, auth_rate_limiter};
use crate::state::AppState;

/// Global prefix for every API route.
pub const API_PREFIX: &str = "/api/v2";

/// Create the `/api/v2` routes, without rate limiting.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/users", users::router())
        .nest("/categories", categories::router())
        .nest("/products", products::router())
        .nest("/carts", carts::router())
        .nest("/wishlists", wishlists::router())
        .nest("/shipping-addresses", addresses::router())
        .nest("/reviews", reviews::router())
        .nest("/orders", orders::router())
        .nest("/payments", payments::router())
        .nest("/analytics", analytics::router())
        .nest("/admin-alerts", alerts::router())
}

/// Create all routes.
pub fn routes() -> Router<AppState> {
    let api = Router::new()
        .nest("/auth", auth::router().layer(auth_rate_limiter()))
        .merge(api_routes().layer(api_rate_limiter()));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest(API_PREFIX, api)
}
