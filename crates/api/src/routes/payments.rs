//! Checkout route handlers.
//!
//! `initiate` and `verify` are thin wrappers over [`CheckoutService`];
//! the webhook feeds the same verification workflow so a payment is
//! fulfilled once whichever of the two arrives first.
//!
//! [`CheckoutService`]: crate::services::CheckoutService

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName, StatusCode},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use tradepost_core::{AddressId, OrderId};

use crate::db::PaymentRepository;
use crate::error::{AppError, Result};
use crate::extract::{Json, Path, Query};
use crate::middleware::RequireAuth;
use crate::models::payment::{InitiatedPayment, PaymentAttempt};
use crate::services::CheckoutError;
use crate::services::paystack::types::WebhookEvent;
use crate::state::AppState;

/// Client-chosen key that makes initiation safe to retry.
pub static IDEMPOTENCY_KEY: HeaderName = HeaderName::from_static("idempotency-key");

/// HMAC-SHA512 of the raw webhook body.
pub static PAYSTACK_SIGNATURE: HeaderName = HeaderName::from_static("x-paystack-signature");

const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

const CHARGE_SUCCESS: &str = "charge.success";

/// Build the `/payments` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/initiate/{shipping_address_id}", post(initiate))
        .route("/verify", get(verify))
        .route("/webhook", post(webhook))
        .route("/{reference}", get(show))
}

/// `?reference=`
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub reference: String,
}

/// Successful verification.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub message: &'static str,
    pub order_id: OrderId,
    pub reference: String,
}

/// Webhook acknowledgement.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>> {
    let Some(value) = headers.get(&IDEMPOTENCY_KEY) else {
        return Ok(None);
    };
    let key = value
        .to_str()
        .map_err(|_| AppError::BadRequest("Idempotency-Key must be ASCII".to_string()))?
        .trim();

    if key.is_empty() {
        return Ok(None);
    }
    if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(AppError::BadRequest(format!(
            "Idempotency-Key must be at most {MAX_IDEMPOTENCY_KEY_LEN} characters"
        )));
    }
    Ok(Some(key.to_owned()))
}

/// `POST /payments/initiate/{shippingAddressId}`
///
/// Responds 201 for a new attempt and 200 when an earlier attempt with
/// the same `Idempotency-Key` is replayed.
///
/// # Errors
///
/// 404/403 for the address, 400 on an empty cart, 502 if the provider fails.
pub async fn initiate(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(shipping_address_id): Path<AddressId>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<InitiatedPayment>)> {
    let key = idempotency_key(&headers)?;
    let (payment, replayed) = state
        .checkout()
        .initiate(&user, shipping_address_id, key.as_deref())
        .await?;

    let status = if replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(payment)))
}

/// `GET /payments/verify?reference=`
///
/// # Errors
///
/// See [`CheckoutError`] for the status of each failure.
pub async fn verify(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<VerifyResponse>> {
    let verified = state.checkout().verify(query.reference.trim()).await?;
    Ok(Json(VerifyResponse {
        message: "Payment verified and order created",
        order_id: verified.order_id,
        reference: verified.reference,
    }))
}

/// Whether a webhook-driven verification failure should still be acknowledged.
///
/// The provider retries on anything but 2xx, which only helps for failures
/// that a later attempt could get past. An attempt held by another caller
/// is retried: that caller may never finish, and its claim expires.
const fn acknowledge(error: &CheckoutError) -> bool {
    matches!(
        error,
        CheckoutError::PaymentNotFound
            | CheckoutError::AlreadyVerified(_)
            | CheckoutError::AlreadyFailed(_)
            | CheckoutError::VerificationFailed
            | CheckoutError::Unfulfillable(_)
    )
}

/// `POST /payments/webhook`
///
/// # Errors
///
/// 401 on a missing or invalid signature, 400 on a malformed body.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>> {
    let signature = headers
        .get(&PAYSTACK_SIGNATURE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing webhook signature".to_string()))?;

    if !state.paystack().verify_webhook_signature(&body, signature) {
        tracing::warn!("Rejected webhook with invalid signature");
        return Err(AppError::Unauthorized(
            "Invalid webhook signature".to_string(),
        ));
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Malformed webhook body: {e}")))?;

    if event.event != CHARGE_SUCCESS {
        tracing::debug!(event = %event.event, "Ignoring webhook event");
        return Ok(Json(WebhookAck { received: true }));
    }

    let Some(reference) = event.data.reference else {
        tracing::warn!("charge.success webhook without a reference");
        return Ok(Json(WebhookAck { received: true }));
    };

    match state.checkout().verify(&reference).await {
        Ok(verified) => {
            tracing::info!(
                reference = %verified.reference,
                order_id = %verified.order_id,
                "Webhook fulfilled payment"
            );
        }
        Err(e) if acknowledge(&e) => {
            tracing::info!(reference = %reference, error = %e, "Webhook verification settled");
        }
        Err(e) => {
            tracing::error!(reference = %reference, error = %e, "Webhook verification failed");
            return Err(e.into());
        }
    }

    Ok(Json(WebhookAck { received: true }))
}

/// `GET /payments/{reference}` (owner or admin)
///
/// # Errors
///
/// 404 if unknown, 403 for someone else's payment.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(reference): Path<String>,
) -> Result<Json<PaymentAttempt>> {
    let attempt = PaymentRepository::new(state.pool())
        .get_by_reference(&reference)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

    if !user.can_access(attempt.user_id) {
        return Err(AppError::Forbidden(
            "You do not have access to this payment".to_string(),
        ));
    }
    Ok(Json(attempt))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    use crate::services::paystack::PaystackError;

    fn headers_with_key(key: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(&IDEMPOTENCY_KEY, HeaderValue::from_str(key).unwrap());
        headers
    }

    #[test]
    fn test_idempotency_key_optional() {
        assert_eq!(idempotency_key(&HeaderMap::new()).unwrap(), None);
        assert_eq!(idempotency_key(&headers_with_key("   ")).unwrap(), None);
    }

    #[test]
    fn test_idempotency_key_trimmed() {
        assert_eq!(
            idempotency_key(&headers_with_key(" order-42 ")).unwrap(),
            Some("order-42".to_string())
        );
    }

    #[test]
    fn test_idempotency_key_too_long() {
        let key = "k".repeat(MAX_IDEMPOTENCY_KEY_LEN + 1);
        assert!(idempotency_key(&headers_with_key(&key)).is_err());
    }

    #[test]
    fn test_webhook_acknowledges_settled_attempts() {
        assert!(acknowledge(&CheckoutError::PaymentNotFound));
        assert!(acknowledge(&CheckoutError::AlreadyVerified(Some(OrderId::new()))));
        assert!(acknowledge(&CheckoutError::AlreadyFailed("declined".to_string())));
        assert!(acknowledge(&CheckoutError::Unfulfillable("late charge".to_string())));
    }

    #[test]
    fn test_webhook_retries_provider_outage() {
        let err = CheckoutError::Provider(PaystackError::Parse("bad gateway".to_string()));
        assert!(!acknowledge(&err));
    }

    #[test]
    fn test_webhook_retries_unfinished_verification() {
        assert!(!acknowledge(&CheckoutError::InProgress));
        assert!(!acknowledge(&CheckoutError::NotCompleted("ongoing".to_string())));
    }

    #[test]
    fn test_webhook_event_parses_reference() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{"event":"charge.success","data":{"reference":"tp_abc","amount":5000}}"#,
        )
        .unwrap();
        assert_eq!(event.event, CHARGE_SUCCESS);
        assert_eq!(event.data.reference.as_deref(), Some("tp_abc"));
    }
}
