//! Integration tests for the checkout state machine.
//!
//! These exercise the public status rules, money conversion and outbox
//! payloads the checkout workflow is built on, without a database.

#![allow(clippy::unwrap_used)]

use rust_decimal::Decimal;
use tradepost_api::error::AppError;
use tradepost_api::models::outbox::{OrderPlaced, OutboxMessage, RefundRequired};
use tradepost_api::services::{AlertEvent, CheckoutError};
use tradepost_core::{Money, OrderId, OrderStatus, PaymentStatus, UserId};

// =============================================================================
// Payment Status Transitions
// =============================================================================

#[test]
fn test_happy_path_reaches_fulfilled() {
    let mut status = PaymentStatus::Pending;
    for next in [
        PaymentStatus::Verifying,
        PaymentStatus::Verified,
        PaymentStatus::Fulfilled,
    ] {
        status = status.transition_to(next).expect("valid step");
    }
    assert!(status.is_terminal());
}

#[test]
fn test_unreachable_provider_returns_to_pending() {
    let status = PaymentStatus::Pending
        .transition_to(PaymentStatus::Verifying)
        .and_then(|s| s.transition_to(PaymentStatus::Pending));
    assert_eq!(status.ok(), Some(PaymentStatus::Pending));
}

#[test]
fn test_compensation_fails_verified_attempt() {
    assert!(PaymentStatus::Verified.can_transition_to(PaymentStatus::Failed));
}

#[test]
fn test_cannot_fulfil_without_verification() {
    assert!(!PaymentStatus::Pending.can_transition_to(PaymentStatus::Fulfilled));
    assert!(!PaymentStatus::Verifying.can_transition_to(PaymentStatus::Fulfilled));
}

#[test]
fn test_terminal_states_are_final() {
    let all = [
        PaymentStatus::Pending,
        PaymentStatus::Verifying,
        PaymentStatus::Verified,
        PaymentStatus::Failed,
        PaymentStatus::Fulfilled,
    ];
    for from in [PaymentStatus::Failed, PaymentStatus::Fulfilled] {
        for to in all {
            assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
        }
    }
}

#[test]
fn test_second_verifier_cannot_claim() {
    // A concurrent verify sees `verifying` and must not claim again.
    assert!(!PaymentStatus::Verifying.can_transition_to(PaymentStatus::Verifying));
}

// =============================================================================
// Orders Created by Fulfilment
// =============================================================================

#[test]
fn test_fulfilled_orders_start_paid_and_count_as_revenue() {
    assert!(OrderStatus::Paid.counts_as_revenue());
    assert!(!OrderStatus::Pending.counts_as_revenue());
    assert!(!OrderStatus::Cancelled.counts_as_revenue());
}

#[test]
fn test_order_total_matches_amount_charged() {
    let lines = [(2, Decimal::new(1999, 2)), (1, Decimal::new(500, 2))];
    let total = Money::total_of(lines).unwrap();
    assert_eq!(total.amount(), Decimal::new(4498, 2));
    assert_eq!(total.to_minor_units().unwrap(), 4498);
}

// =============================================================================
// Error Responses
// =============================================================================

#[test]
fn test_checkout_errors_map_to_client_statuses() {
    let cases = [
        (CheckoutError::EmptyCart, 400),
        (CheckoutError::AddressNotFound, 404),
        (CheckoutError::AddressForbidden, 403),
        (CheckoutError::PaymentNotFound, 404),
        (CheckoutError::InProgress, 409),
        (CheckoutError::AlreadyVerified(Some(OrderId::new())), 409),
        (CheckoutError::VerificationFailed, 400),
        (
            CheckoutError::Unfulfillable("insufficient stock after payment".to_string()),
            409,
        ),
    ];
    for (err, expected) in cases {
        let app: AppError = err.into();
        assert_eq!(app.status().as_u16(), expected, "{app}");
    }
}

// =============================================================================
// Outbox Side Effects
// =============================================================================

#[test]
fn test_order_placed_payload_survives_storage() {
    let message = OutboxMessage::OrderPlaced(OrderPlaced {
        order_id: OrderId::new(),
        user_id: UserId::new(),
        total: Decimal::new(4498, 2),
    });
    let stored = message.payload().unwrap();
    let decoded = OutboxMessage::decode(message.event_type(), stored).unwrap();
    assert_eq!(decoded, Some(message));
}

#[test]
fn test_refund_required_event_type() {
    let message = OutboxMessage::RefundRequired(RefundRequired {
        reference: "tp_0123".to_string(),
        user_id: UserId::new(),
        amount: Decimal::new(10_000, 2),
        currency: "NGN".to_string(),
        reason: "insufficient stock after payment".to_string(),
    });
    assert_eq!(message.event_type(), "refund_required");
}

#[test]
fn test_admin_alert_wire_format() {
    let event = AlertEvent::RefundRequired {
        message: "Refund required".to_string(),
        reference: "tp_0123".to_string(),
        amount: Decimal::new(10_000, 2),
        currency: "NGN".to_string(),
        reason: "insufficient stock after payment".to_string(),
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["event"], "refundRequired");
    assert_eq!(json["data"]["reference"], "tp_0123");
}
