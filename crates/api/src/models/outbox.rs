//! Outbox events: side effects written in the same transaction as the
//! state change that caused them, delivered later by the outbox worker.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tradepost_core::{OrderId, OrderStatus, OutboxEventId, ProductId, UserId};

/// Outbox row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OutboxEvent {
    pub id: OutboxEventId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub available_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A paid order was created from a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub total: Decimal,
}

/// An admin moved an order to a new status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
}

/// Stock fell to or below the alert threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStock {
    pub product_id: ProductId,
    pub product_name: String,
    pub stock: i32,
}

/// A charge succeeded but the order could not be fulfilled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequired {
    pub reference: String,
    pub user_id: UserId,
    pub amount: Decimal,
    pub currency: String,
    pub reason: String,
}

/// Typed outbox message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboxMessage {
    OrderPlaced(OrderPlaced),
    OrderStatusChanged(OrderStatusChanged),
    LowStock(LowStock),
    RefundRequired(RefundRequired),
}

impl OutboxMessage {
    pub const ORDER_PLACED: &'static str = "order_placed";
    pub const ORDER_STATUS_CHANGED: &'static str = "order_status_changed";
    pub const LOW_STOCK: &'static str = "low_stock";
    pub const REFUND_REQUIRED: &'static str = "refund_required";

    /// Value stored in `event_type`.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::OrderPlaced(_) => Self::ORDER_PLACED,
            Self::OrderStatusChanged(_) => Self::ORDER_STATUS_CHANGED,
            Self::LowStock(_) => Self::LOW_STOCK,
            Self::RefundRequired(_) => Self::REFUND_REQUIRED,
        }
    }

    /// Value stored in `payload`.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the payload cannot be serialized.
    pub fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::OrderPlaced(p) => serde_json::to_value(p),
            Self::OrderStatusChanged(p) => serde_json::to_value(p),
            Self::LowStock(p) => serde_json::to_value(p),
            Self::RefundRequired(p) => serde_json::to_value(p),
        }
    }

    /// Decode a stored row. Returns `Ok(None)` for event types this build
    /// does not know.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if a known event has a malformed payload.
    pub fn decode(
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<Option<Self>, serde_json::Error> {
        let message = match event_type {
            Self::ORDER_PLACED => Self::OrderPlaced(serde_json::from_value(payload)?),
            Self::ORDER_STATUS_CHANGED => {
                Self::OrderStatusChanged(serde_json::from_value(payload)?)
            }
            Self::LOW_STOCK => Self::LowStock(serde_json::from_value(payload)?),
            Self::REFUND_REQUIRED => Self::RefundRequired(serde_json::from_value(payload)?),
            _ => return Ok(None),
        };
        Ok(Some(message))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_stored_low_stock() {
        let message = OutboxMessage::LowStock(LowStock {
            product_id: ProductId::new(),
            product_name: "Linen Shirt".to_string(),
            stock: 2,
        });
        let payload = message.payload().unwrap();
        let decoded = OutboxMessage::decode(message.event_type(), payload).unwrap();
        assert_eq!(decoded, Some(message));
    }

    #[test]
    fn test_decode_unknown_type() {
        let decoded = OutboxMessage::decode("gift_card_issued", serde_json::json!({})).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_decode_malformed_payload() {
        let result = OutboxMessage::decode("order_placed", serde_json::json!({"order_id": 7}));
        assert!(result.is_err());
    }
}
