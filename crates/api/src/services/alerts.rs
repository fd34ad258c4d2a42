//! Real-time admin alerts.
//!
//! The outbox worker publishes into an [`AlertHub`]; every connected admin
//! websocket holds a receiver. Nobody listening is not an error.

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;

use tradepost_core::{OrderId, ProductId};

/// Messages buffered per receiver before it starts lagging.
pub const CHANNEL_CAPACITY: usize = 256;

/// An alert as sent over the socket: `{"event": ..., "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum AlertEvent {
    #[serde(rename_all = "camelCase")]
    NewOrder {
        message: String,
        order_id: OrderId,
        total: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    LowStock {
        message: String,
        product_id: ProductId,
        product_name: String,
        stock: i32,
    },
    #[serde(rename_all = "camelCase")]
    RefundRequired {
        message: String,
        reference: String,
        amount: Decimal,
        currency: String,
        reason: String,
    },
}

/// Fan-out hub for admin alerts.
#[derive(Clone)]
pub struct AlertHub {
    sender: broadcast::Sender<AlertEvent>,
}

impl AlertHub {
    /// Create a hub with [`CHANNEL_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Send an alert to every connected admin. Returns how many received it.
    pub fn publish(&self, event: AlertEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// A receiver for one socket.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.sender.subscribe()
    }

    /// Number of connected receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for AlertHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_wire_shape() {
        let order_id = OrderId::new();
        let event = AlertEvent::NewOrder {
            message: "New order placed".to_owned(),
            order_id,
            total: Decimal::from_str("42.50").unwrap(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "newOrder");
        assert_eq!(json["data"]["message"], "New order placed");
        assert_eq!(json["data"]["orderId"], order_id.to_string());
        assert_eq!(json["data"]["total"], "42.50");
    }

    #[test]
    fn test_publish_without_listeners() {
        let hub = AlertHub::new();
        let sent = hub.publish(AlertEvent::LowStock {
            message: "Low stock".to_owned(),
            product_id: ProductId::new(),
            product_name: "Mug".to_owned(),
            stock: 1,
        });
        assert_eq!(sent, 0);
    }

    #[tokio::test]
    async fn test_fan_out() {
        let hub = AlertHub::new();
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();
        assert_eq!(hub.receiver_count(), 2);

        let event = AlertEvent::RefundRequired {
            message: "Refund required".to_owned(),
            reference: "tp_abc".to_owned(),
            amount: Decimal::from(10),
            currency: "NGN".to_owned(),
            reason: "insufficient stock after payment".to_owned(),
        };
        assert_eq!(hub.publish(event.clone()), 2);
        assert_eq!(first.recv().await.unwrap(), event);
        assert_eq!(second.recv().await.unwrap(), event);
    }
}
