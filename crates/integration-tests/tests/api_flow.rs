//! HTTP flows against a running API.
//!
//! These tests require:
//! - A running `PostgreSQL` database with migrations applied (`tp-cli migrate`)
//! - The API server running (`cargo run -p tradepost-api`)
//!
//! Run with: cargo test -p tradepost-integration-tests -- --ignored

use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tradepost_integration_tests::{api_base_url, api_url, unique_email};

const PASSWORD: &str = "Correct-Horse-Battery-9";

fn client() -> Client {
    Client::builder()
        .cookie_store(true)
        .build()
        .expect("Failed to create HTTP client")
}

/// Register a fresh customer and log in, leaving the session cookie in `client`.
async fn logged_in_customer(client: &Client) -> Value {
    let email = unique_email("customer");
    let resp = client
        .post(api_url("/auth/register"))
        .json(&json!({"email": email, "password": PASSWORD, "name": "Test Customer"}))
        .send()
        .await
        .expect("Failed to register");
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = client
        .post(api_url("/auth/login"))
        .json(&json!({"email": email, "password": PASSWORD}))
        .send()
        .await
        .expect("Failed to log in");
    assert_eq!(resp.status(), StatusCode::OK);
    resp.json().await.expect("Failed to read profile")
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_health_endpoints() {
    let client = client();
    let base = api_base_url();

    let resp = client.get(format!("{base}/health")).send().await.expect("health");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.expect("body"), "ok");

    let resp = client
        .get(format!("{base}/health/ready"))
        .send()
        .await
        .expect("readiness");
    assert_eq!(resp.status(), StatusCode::OK);
}

// ============================================================================
// Auth
// ============================================================================

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_profile_requires_session() {
    let resp = client()
        .get(api_url("/auth/profile"))
        .send()
        .await
        .expect("profile");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let body: Value = resp.json().await.expect("error body");
    assert_eq!(body["statusCode"], 401);
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_login_then_logout() {
    let client = client();
    let profile = logged_in_customer(&client).await;
    assert_eq!(profile["role"], "USER");

    let resp = client.get(api_url("/auth/profile")).send().await.expect("profile");
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client.post(api_url("/auth/logout")).send().await.expect("logout");
    assert!(resp.status().is_success());

    let resp = client.get(api_url("/auth/profile")).send().await.expect("profile");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_wrong_password_is_generic() {
    let client = client();
    let resp = client
        .post(api_url("/auth/login"))
        .json(&json!({"email": unique_email("nobody"), "password": PASSWORD}))
        .send()
        .await
        .expect("login");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Cart & Checkout
// ============================================================================

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_empty_cart_total_is_zero() {
    let client = client();
    logged_in_customer(&client).await;

    let resp = client.get(api_url("/carts/total")).send().await.expect("total");
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.expect("total body");
    let total: Decimal = body["total"]
        .as_str()
        .and_then(|t| t.parse().ok())
        .expect("decimal total");
    assert_eq!(total, Decimal::ZERO);
}

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_checkout_rejects_empty_cart() {
    let client = client();
    logged_in_customer(&client).await;

    let resp = client
        .post(api_url("/shipping-addresses"))
        .json(&json!({
            "fullName": "Test Customer",
            "streetAddress": "1 Marina Road",
            "city": "Lagos",
            "state": "Lagos",
            "zipCode": "101001",
            "country": "Nigeria"
        }))
        .send()
        .await
        .expect("create address");
    assert_eq!(resp.status(), StatusCode::CREATED);
    let address: Value = resp.json().await.expect("address body");
    let address_id = address["id"].as_str().expect("address id");

    let resp = client
        .post(api_url(&format!("/payments/initiate/{address_id}")))
        .header("Idempotency-Key", uuid::Uuid::new_v4().to_string())
        .send()
        .await
        .expect("initiate");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.expect("error body");
    assert_eq!(body["message"], "Cart is empty");
}

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_verify_unknown_reference() {
    let resp = client()
        .get(api_url("/payments/verify"))
        .query(&[("reference", "tp_does_not_exist")])
        .send()
        .await
        .expect("verify");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_webhook_requires_signature() {
    let client = client();
    let body = r#"{"event":"charge.success","data":{"reference":"tp_x"}}"#;

    let resp = client
        .post(api_url("/payments/webhook"))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .expect("webhook");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = client
        .post(api_url("/payments/webhook"))
        .header("x-paystack-signature", "00ff")
        .body(body)
        .send()
        .await
        .expect("webhook");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Admin
// ============================================================================

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_customers_cannot_reach_admin_routes() {
    let client = client();
    logged_in_customer(&client).await;

    for path in ["/users", "/orders", "/analytics/summary", "/admin-alerts"] {
        let resp = client.get(api_url(path)).send().await.expect("admin route");
        assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{path}");
    }
}
