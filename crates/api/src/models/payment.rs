//! Payment attempt models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use tradepost_core::{AddressId, CartId, OrderId, PaymentId, PaymentStatus, UserId};

/// One run through checkout, keyed by its provider reference.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAttempt {
    pub id: PaymentId,
    pub user_id: UserId,
    pub cart_id: CartId,
    pub shipping_address_id: Option<AddressId>,
    pub reference: String,
    #[serde(skip_serializing)]
    pub idempotency_key: Option<String>,
    pub amount: Decimal,
    pub amount_minor: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub authorization_url: Option<String>,
    pub failure_reason: Option<String>,
    #[serde(skip_serializing)]
    pub provider_payload: Option<serde_json::Value>,
    pub order_id: Option<OrderId>,
    #[serde(skip_serializing)]
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a fresh `pending` attempt.
#[derive(Debug, Clone)]
pub struct NewPaymentAttempt {
    pub user_id: UserId,
    pub cart_id: CartId,
    pub shipping_address_id: AddressId,
    pub reference: String,
    pub idempotency_key: Option<String>,
    pub amount: Decimal,
    pub amount_minor: i64,
    pub currency: String,
}

/// Response to a checkout initiation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatedPayment {
    pub reference: String,
    pub authorization_url: Option<String>,
    pub status: PaymentStatus,
}

impl From<&PaymentAttempt> for InitiatedPayment {
    fn from(attempt: &PaymentAttempt) -> Self {
        Self {
            reference: attempt.reference.clone(),
            authorization_url: attempt.authorization_url.clone(),
            status: attempt.status,
        }
    }
}
