//! Integration tests for Tradepost.
//!
//! # Running Tests
//!
//! ```bash
//! # Cross-crate tests (no services needed)
//! cargo test -p tradepost-integration-tests
//!
//! # Live server tests: start PostgreSQL, run `tp-cli migrate`, start the API, then
//! cargo test -p tradepost-integration-tests -- --ignored
//!
//! # Checkout tests need only PostgreSQL (Paystack is mocked locally)
//! TRADEPOST_TEST_DATABASE_URL=postgres://localhost/tradepost_test \
//!     cargo test -p tradepost-integration-tests --test checkout_fulfilment -- --ignored
//! ```
//!
//! # Test Files
//!
//! - `payment_state_machine` - checkout status rules and outbox payloads
//! - `webhook_signature` - Paystack webhook HMAC verification
//! - `api_flow` - HTTP flows against a running server (`#[ignore]`)
//! - `checkout_fulfilment` - verify, refunds and concurrent writes against PostgreSQL (`#[ignore]`)

/// Base URL of a running API (configurable via `TRADEPOST_TEST_URL`).
#[must_use]
pub fn api_base_url() -> String {
    std::env::var("TRADEPOST_TEST_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

/// `{base}/api/v2{path}`.
#[must_use]
pub fn api_url(path: &str) -> String {
    format!("{}/api/v2{path}", api_base_url())
}

/// A unique address so repeated runs do not collide.
#[must_use]
pub fn unique_email(prefix: &str) -> String {
    format!("{prefix}-{}@example.com", uuid::Uuid::new_v4().simple())
}
