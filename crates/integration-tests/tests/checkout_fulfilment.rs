//! Checkout, cart and category behaviour against a real database.
//!
//! Paystack is replaced by a local axum server, so only PostgreSQL is
//! needed:
//!
//! ```bash
//! export TRADEPOST_TEST_DATABASE_URL=postgres://localhost/tradepost_test
//! cargo test -p tradepost-integration-tests --test checkout_fulfilment -- --ignored
//! ```

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::Notify;

use tradepost_api::config::PaystackConfig;
use tradepost_api::db::categories::PARENT_CYCLE;
use tradepost_api::db::payments::Claim;
use tradepost_api::db::{CartRepository, CategoryRepository, PaymentRepository, RepositoryError};
use tradepost_api::error::AppError;
use tradepost_api::models::payment::{NewPaymentAttempt, PaymentAttempt};
use tradepost_api::services::{CheckoutError, CheckoutService, PaystackClient};
use tradepost_core::{AddressId, CartId, CategoryId, PaymentStatus, ProductId, UserId};

const PRICE_MINOR: i64 = 250_000;

// =============================================================================
// Harness
// =============================================================================

/// What the mock provider reports for every reference.
#[derive(Debug, Clone)]
struct Charge {
    status: &'static str,
    amount: i64,
}

type SharedCharge = Arc<Mutex<Charge>>;

async fn verify_transaction(
    State(charge): State<SharedCharge>,
    Path(reference): Path<String>,
) -> Json<Value> {
    let charge = charge.lock().unwrap().clone();
    Json(json!({
        "status": true,
        "message": "Verification successful",
        "data": {
            "status": charge.status,
            "reference": reference,
            "amount": charge.amount,
            "currency": "NGN",
            "gateway_response": "Approved",
        }
    }))
}

/// Serve the verify endpoint on an ephemeral port and return its base URL.
async fn mock_paystack(charge: SharedCharge) -> String {
    let app = Router::new()
        .route("/transaction/verify/{reference}", get(verify_transaction))
        .with_state(charge);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn connect() -> PgPool {
    let url = std::env::var("TRADEPOST_TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/tradepost_test".to_string());
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&url)
        .await
        .unwrap();
    sqlx::migrate!("../api/migrations").run(&pool).await.unwrap();
    pool
}

struct Harness {
    pool: PgPool,
    charge: SharedCharge,
    config: PaystackConfig,
    paystack: PaystackClient,
    outbox: Notify,
}

impl Harness {
    async fn start() -> Self {
        let pool = connect().await;
        let charge = Arc::new(Mutex::new(Charge {
            status: "success",
            amount: PRICE_MINOR * 2,
        }));
        let config = PaystackConfig {
            secret_key: "sk_test_local".to_string().into(),
            base_url: mock_paystack(charge.clone()).await,
            callback_url: None,
            currency: "NGN".to_string(),
        };
        let paystack = PaystackClient::new(&config).unwrap();
        Self {
            pool,
            charge,
            config,
            paystack,
            outbox: Notify::new(),
        }
    }

    fn checkout(&self) -> CheckoutService<'_> {
        CheckoutService::new(&self.pool, &self.paystack, &self.config, 0, &self.outbox)
    }

    fn respond_with(&self, status: &'static str, amount: i64) {
        *self.charge.lock().unwrap() = Charge { status, amount };
    }

    async fn attempt(&self, reference: &str) -> PaymentAttempt {
        PaymentRepository::new(&self.pool)
            .get_by_reference(reference)
            .await
            .unwrap()
            .unwrap()
    }

    async fn stock(&self, product_id: ProductId) -> i32 {
        sqlx::query_scalar("SELECT stock FROM shop.product WHERE id = $1")
            .bind(product_id)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    async fn cart_lines(&self, cart_id: CartId) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM shop.cart_item WHERE cart_id = $1")
            .bind(cart_id)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    async fn orders_for(&self, reference: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM shop.order WHERE payment_reference = $1")
            .bind(reference)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    async fn refunds_for(&self, reference: &str) -> i64 {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM shop.outbox_event \
             WHERE event_type = 'refund_required' AND payload->>'reference' = $1",
        )
        .bind(reference)
        .fetch_one(&self.pool)
        .await
        .unwrap()
    }
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}

async fn insert_user(pool: &PgPool) -> UserId {
    let id = UserId::new();
    sqlx::query("INSERT INTO shop.user (id, email, name) VALUES ($1, $2, 'Ada Buyer')")
        .bind(id)
        .bind(tradepost_integration_tests::unique_email("buyer"))
        .execute(pool)
        .await
        .unwrap();
    id
}

async fn insert_category(pool: &PgPool, parent: Option<CategoryId>) -> CategoryId {
    let id = CategoryId::new();
    sqlx::query("INSERT INTO shop.category (id, name, parent_id) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(unique("category"))
        .bind(parent)
        .execute(pool)
        .await
        .unwrap();
    id
}

async fn insert_product(pool: &PgPool, stock: i32) -> ProductId {
    let category = insert_category(pool, None).await;
    let id = ProductId::new();
    sqlx::query(
        "INSERT INTO shop.product (id, name, description, price, stock, sku, category_id) \
         VALUES ($1, $2, 'Hand-woven basket', $3, $4, $5, $6)",
    )
    .bind(id)
    .bind(unique("basket"))
    .bind(Decimal::new(PRICE_MINOR, 2))
    .bind(stock)
    .bind(unique("SKU"))
    .bind(category)
    .execute(pool)
    .await
    .unwrap();
    id
}

/// A user with two units of one product in their cart and a pending attempt
/// for it.
struct Checkout {
    cart_id: CartId,
    product_id: ProductId,
    reference: String,
}

async fn pending_checkout(harness: &Harness, stock: i32) -> Checkout {
    let pool = &harness.pool;
    let user_id = insert_user(pool).await;
    let product_id = insert_product(pool, stock).await;

    let cart = CartRepository::new(pool).get_or_create(user_id).await.unwrap();
    CartRepository::new(pool)
        .add_item(cart.id, product_id, 2)
        .await
        .unwrap();

    let address_id = AddressId::new();
    sqlx::query(
        "INSERT INTO shop.shipping_address \
         (id, user_id, full_name, street_address, city, state, zip_code, country) \
         VALUES ($1, $2, 'Ada Buyer', '1 Marina Road', 'Lagos', 'Lagos', '101001', 'NG')",
    )
    .bind(address_id)
    .bind(user_id)
    .execute(pool)
    .await
    .unwrap();

    let reference = unique("tp");
    PaymentRepository::new(pool)
        .insert_pending(&NewPaymentAttempt {
            user_id,
            cart_id: cart.id,
            shipping_address_id: address_id,
            reference: reference.clone(),
            idempotency_key: None,
            amount: Decimal::new(PRICE_MINOR * 2, 2),
            amount_minor: PRICE_MINOR * 2,
            currency: "NGN".to_string(),
        })
        .await
        .unwrap();

    Checkout {
        cart_id: cart.id,
        product_id,
        reference,
    }
}

// =============================================================================
// Fulfilment
// =============================================================================

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_paid_checkout_creates_order_and_takes_stock() {
    let harness = Harness::start().await;
    let checkout = pending_checkout(&harness, 5).await;

    let verified = harness.checkout().verify(&checkout.reference).await.unwrap();

    let attempt = harness.attempt(&checkout.reference).await;
    assert_eq!(attempt.status, PaymentStatus::Fulfilled);
    assert_eq!(attempt.order_id, Some(verified.order_id));
    assert!(attempt.provider_payload.is_some());
    assert_eq!(harness.orders_for(&checkout.reference).await, 1);
    assert_eq!(harness.stock(checkout.product_id).await, 3);
    assert_eq!(harness.cart_lines(checkout.cart_id).await, 0);

    let again = harness.checkout().verify(&checkout.reference).await;
    assert!(matches!(again, Err(CheckoutError::AlreadyVerified(Some(id))) if id == verified.order_id));
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_stock_shortfall_after_payment_queues_refund() {
    let harness = Harness::start().await;
    let checkout = pending_checkout(&harness, 5).await;
    sqlx::query("UPDATE shop.product SET stock = 1 WHERE id = $1")
        .bind(checkout.product_id)
        .execute(&harness.pool)
        .await
        .unwrap();

    let err = harness
        .checkout()
        .verify(&checkout.reference)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Unfulfillable(_)));
    assert_eq!(AppError::from(err).status().as_u16(), 409);
    let attempt = harness.attempt(&checkout.reference).await;
    assert_eq!(attempt.status, PaymentStatus::Failed);
    assert_eq!(harness.refunds_for(&checkout.reference).await, 1);
    assert_eq!(harness.orders_for(&checkout.reference).await, 0);
    assert_eq!(harness.stock(checkout.product_id).await, 1);
    assert_eq!(harness.cart_lines(checkout.cart_id).await, 1);
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_concurrent_verifies_create_one_order() {
    let harness = Harness::start().await;
    let checkout = pending_checkout(&harness, 5).await;
    let service = harness.checkout();

    let (first, second) = tokio::join!(
        service.verify(&checkout.reference),
        service.verify(&checkout.reference)
    );

    let fulfilled = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(fulfilled, 1, "{first:?} / {second:?}");
    for loser in [first, second].into_iter().filter_map(Result::err) {
        assert!(matches!(
            loser,
            CheckoutError::InProgress | CheckoutError::AlreadyVerified(_)
        ));
    }
    assert_eq!(harness.orders_for(&checkout.reference).await, 1);
    assert_eq!(harness.stock(checkout.product_id).await, 3);
}

// =============================================================================
// Provider Outcomes
// =============================================================================

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_abandoned_payment_can_be_verified_later() {
    let harness = Harness::start().await;
    let checkout = pending_checkout(&harness, 5).await;

    harness.respond_with("abandoned", PRICE_MINOR * 2);
    let err = harness
        .checkout()
        .verify(&checkout.reference)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::NotCompleted(ref s) if s == "abandoned"));
    assert_eq!(
        harness.attempt(&checkout.reference).await.status,
        PaymentStatus::Pending
    );

    harness.respond_with("success", PRICE_MINOR * 2);
    harness.checkout().verify(&checkout.reference).await.unwrap();
    assert_eq!(harness.orders_for(&checkout.reference).await, 1);
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_declined_payment_fails_without_refund() {
    let harness = Harness::start().await;
    let checkout = pending_checkout(&harness, 5).await;
    harness.respond_with("failed", PRICE_MINOR * 2);

    let err = harness
        .checkout()
        .verify(&checkout.reference)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::VerificationFailed));
    assert_eq!(
        harness.attempt(&checkout.reference).await.status,
        PaymentStatus::Failed
    );
    assert_eq!(harness.refunds_for(&checkout.reference).await, 0);
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_wrong_amount_is_never_verified() {
    let harness = Harness::start().await;
    let checkout = pending_checkout(&harness, 5).await;
    harness.respond_with("success", PRICE_MINOR);

    let err = harness
        .checkout()
        .verify(&checkout.reference)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::VerificationFailed));
    let attempt = harness.attempt(&checkout.reference).await;
    assert_eq!(attempt.status, PaymentStatus::Failed);
    assert!(attempt.provider_payload.is_some());
    assert_eq!(harness.refunds_for(&checkout.reference).await, 1);
    assert_eq!(harness.orders_for(&checkout.reference).await, 0);
    assert_eq!(harness.stock(checkout.product_id).await, 5);
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_charge_on_failed_attempt_is_refunded_once() {
    let harness = Harness::start().await;
    let checkout = pending_checkout(&harness, 5).await;
    let attempt = harness.attempt(&checkout.reference).await;
    PaymentRepository::new(&harness.pool)
        .mark_failed(attempt.id, PaymentStatus::Pending, "Payment initialization failed")
        .await
        .unwrap();

    let first = harness.checkout().verify(&checkout.reference).await;
    assert!(matches!(first, Err(CheckoutError::Unfulfillable(_))));
    assert_eq!(harness.refunds_for(&checkout.reference).await, 1);

    let second = harness.checkout().verify(&checkout.reference).await;
    assert!(matches!(second, Err(CheckoutError::AlreadyFailed(_))));
    assert_eq!(harness.refunds_for(&checkout.reference).await, 1);
    assert_eq!(harness.orders_for(&checkout.reference).await, 0);
}

// =============================================================================
// Verification Claims
// =============================================================================

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_abandoned_claim_is_taken_over_after_lease() {
    let harness = Harness::start().await;
    let checkout = pending_checkout(&harness, 5).await;
    let payments = PaymentRepository::new(&harness.pool);

    let claim = payments
        .claim_for_verification(&checkout.reference)
        .await
        .unwrap();
    assert!(matches!(claim, Claim::Claimed(_)));

    let err = harness
        .checkout()
        .verify(&checkout.reference)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::InProgress));

    sqlx::query(
        "UPDATE shop.payment_attempt SET claimed_at = NOW() - INTERVAL '10 minutes' \
         WHERE reference = $1",
    )
    .bind(&checkout.reference)
    .execute(&harness.pool)
    .await
    .unwrap();

    harness.checkout().verify(&checkout.reference).await.unwrap();
    assert_eq!(
        harness.attempt(&checkout.reference).await.status,
        PaymentStatus::Fulfilled
    );
}

// =============================================================================
// Concurrent Writes
// =============================================================================

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_concurrent_first_adds_respect_stock() {
    let pool = connect().await;
    let user_id = insert_user(&pool).await;
    let product_id = insert_product(&pool, 3).await;
    let carts = CartRepository::new(&pool);
    let cart = carts.get_or_create(user_id).await.unwrap();

    let (first, second) = tokio::join!(
        carts.add_item(cart.id, product_id, 2),
        carts.add_item(cart.id, product_id, 2)
    );

    let added = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(added, 1, "{first:?} / {second:?}");
    assert!(
        [first, second]
            .into_iter()
            .filter_map(Result::err)
            .all(|e| matches!(e, RepositoryError::Invalid(_)))
    );
    let quantity: i32 = sqlx::query_scalar(
        "SELECT quantity FROM shop.cart_item WHERE cart_id = $1 AND product_id = $2",
    )
    .bind(cart.id)
    .bind(product_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(quantity, 2);
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_crossed_reparents_cannot_form_cycle() {
    let pool = connect().await;
    let a = insert_category(&pool, None).await;
    let b = insert_category(&pool, None).await;
    let categories = CategoryRepository::new(&pool);

    let (first, second) = tokio::join!(
        categories.update(a, None, Some(Some(b))),
        categories.update(b, None, Some(Some(a)))
    );

    let moved = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(moved, 1, "{first:?} / {second:?}");
    assert!(
        [first, second]
            .into_iter()
            .filter_map(Result::err)
            .all(|e| matches!(e, RepositoryError::Invalid(ref m) if m == PARENT_CYCLE))
    );

    let parents: Vec<Option<CategoryId>> =
        sqlx::query_scalar("SELECT parent_id FROM shop.category WHERE id = ANY($1)")
            .bind(vec![a, b])
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(parents.iter().filter(|p| p.is_some()).count(), 1);
}
