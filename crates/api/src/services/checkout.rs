//! Checkout workflow.
//!
//! ```text
//! initiate:  pending ──(provider rejects)──> failed
//! verify:    pending -> verifying ──(unreachable, not paid yet)──> pending
//!                         │ ├──(failed, reversed)──> failed
//!                         │ └──(wrong amount)──> failed + refund_required
//!                         v
//!                      verified -> fulfilled
//!                         └──(no stock)──> failed + refund_required
//! ```
//!
//! A charge that succeeds for an attempt that had already failed without
//! one is refunded too (`failed` + `refund_required`).
//!
//! The provider is only called between transactions. Side effects (emails,
//! admin alerts) are written to the outbox by the repository and the worker
//! is woken once the transaction has committed.

use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::Notify;
use uuid::Uuid;

use tradepost_core::{AddressId, Money, MoneyError, OrderId, PaymentStatus};

use crate::config::PaystackConfig;
use crate::db::payments::{Claim, Fulfilment};
use crate::db::{AddressRepository, CartRepository, PaymentRepository, RepositoryError};
use crate::models::CurrentUser;
use crate::models::payment::{InitiatedPayment, NewPaymentAttempt, PaymentAttempt};
use crate::services::paystack::types::{
    ChargeOutcome, CustomField, InitializeTransaction, TransactionMetadata,
};
use crate::services::paystack::{PaystackClient, PaystackError};

/// Errors from the checkout workflow.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Shipping address does not exist.
    #[error("Shipping address not found")]
    AddressNotFound,

    /// Shipping address belongs to someone else.
    #[error("You do not have access to this shipping address")]
    AddressForbidden,

    /// Nothing to pay for.
    #[error("Cart is empty")]
    EmptyCart,

    /// Unknown payment reference.
    #[error("Payment not found")]
    PaymentNotFound,

    /// The attempt was already turned into an order.
    #[error("Payment already verified")]
    AlreadyVerified(Option<OrderId>),

    /// Another request holds the attempt.
    #[error("Payment verification already in progress")]
    InProgress,

    /// The attempt failed earlier.
    #[error("{0}")]
    AlreadyFailed(String),

    /// The provider did not confirm the charge.
    #[error("Payment verification failed")]
    VerificationFailed,

    /// The customer has not finished paying yet; verify again later.
    #[error("Payment not completed: {0}")]
    NotCompleted(String),

    /// The charge succeeded but the order could not be created. A refund
    /// has been queued for an admin.
    #[error("Payment received but the order could not be completed: {0}. A refund will be issued.")]
    Unfulfillable(String),

    /// Payment provider call failed.
    #[error(transparent)]
    Provider(#[from] PaystackError),

    /// Amount cannot be expressed in minor units.
    #[error("invalid amount: {0}")]
    Amount(#[from] MoneyError),

    /// Repository/database error.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// A successful verification.
#[derive(Debug, Clone)]
pub struct VerifiedOrder {
    pub order_id: OrderId,
    pub reference: String,
}

/// Checkout workflow over the payment state machine.
pub struct CheckoutService<'a> {
    pool: &'a PgPool,
    paystack: &'a PaystackClient,
    config: &'a PaystackConfig,
    low_stock_threshold: i32,
    outbox: &'a Notify,
}

impl<'a> CheckoutService<'a> {
    /// Create a checkout service.
    #[must_use]
    pub const fn new(
        pool: &'a PgPool,
        paystack: &'a PaystackClient,
        config: &'a PaystackConfig,
        low_stock_threshold: i32,
        outbox: &'a Notify,
    ) -> Self {
        Self {
            pool,
            paystack,
            config,
            low_stock_threshold,
            outbox,
        }
    }

    /// Start a payment for the user's cart.
    ///
    /// Returns the attempt and whether it was replayed from an earlier
    /// request with the same idempotency key.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError` if the address or cart is unusable, or the
    /// provider rejects the transaction.
    pub async fn initiate(
        &self,
        user: &CurrentUser,
        shipping_address_id: AddressId,
        idempotency_key: Option<&str>,
    ) -> Result<(InitiatedPayment, bool), CheckoutError> {
        let payments = PaymentRepository::new(self.pool);

        let address = AddressRepository::new(self.pool)
            .get(shipping_address_id)
            .await?
            .ok_or(CheckoutError::AddressNotFound)?;
        if address.user_id != user.id {
            return Err(CheckoutError::AddressForbidden);
        }

        if let Some(key) = idempotency_key
            && let Some(existing) = payments.find_by_idempotency_key(user.id, key).await?
            && !existing.status.is_terminal()
        {
            tracing::info!(reference = %existing.reference, "Replaying checkout for idempotency key");
            return Ok(((&existing).into(), true));
        }

        let view = CartRepository::new(self.pool).view(user.id).await?;
        if view.items.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let cart = view.cart;
        let amount = view.total;
        let amount_minor = Money::new(amount)?.to_minor_units()?;

        let new = NewPaymentAttempt {
            user_id: user.id,
            cart_id: cart.id,
            shipping_address_id,
            reference: new_reference(),
            idempotency_key: idempotency_key.map(str::to_owned),
            amount,
            amount_minor,
            currency: self.config.currency.clone(),
        };

        let attempt = match payments.insert_pending(&new).await {
            Ok(attempt) => attempt,
            // A concurrent request with the same key won the insert.
            Err(RepositoryError::Conflict(msg)) => {
                return match idempotency_key {
                    Some(key) => match payments.find_by_idempotency_key(user.id, key).await? {
                        Some(existing) if !existing.status.is_terminal() => {
                            Ok(((&existing).into(), true))
                        }
                        _ => Err(RepositoryError::Conflict(msg).into()),
                    },
                    None => Err(RepositoryError::Conflict(msg).into()),
                };
            }
            Err(e) => return Err(e.into()),
        };

        let request = InitializeTransaction {
            email: user.email.to_string(),
            amount: attempt.amount_minor,
            reference: attempt.reference.clone(),
            currency: attempt.currency.clone(),
            callback_url: self.config.callback_url.clone(),
            metadata: TransactionMetadata {
                user_id: user.id.to_string(),
                cart_id: cart.id.to_string(),
                shipping_address_id: shipping_address_id.to_string(),
                custom_fields: vec![CustomField {
                    display_name: "Cart ID",
                    variable_name: "cart_id",
                    value: cart.id.to_string(),
                }],
            },
        };

        let initialized = match self.paystack.initialize_transaction(&request).await {
            Ok(initialized) => initialized,
            Err(e) => {
                tracing::error!(reference = %attempt.reference, error = %e, "Payment initialization failed");
                payments
                    .mark_failed(attempt.id, PaymentStatus::Pending, &format!("initialization failed: {e}"))
                    .await?;
                return Err(e.into());
            }
        };

        let attempt = payments
            .set_authorization_url(attempt.id, &initialized.authorization_url)
            .await?;

        tracing::info!(
            reference = %attempt.reference,
            amount = %attempt.amount,
            currency = %attempt.currency,
            "Payment initiated"
        );
        Ok(((&attempt).into(), false))
    }

    /// Verify a payment and, if it went through, create the order.
    ///
    /// Safe to call repeatedly and concurrently for the same reference
    /// (browser redirect and webhook): exactly one call fulfils.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError` describing why no order was created by this call.
    pub async fn verify(&self, reference: &str) -> Result<VerifiedOrder, CheckoutError> {
        let payments = PaymentRepository::new(self.pool);

        let claim = payments
            .claim_for_verification(reference)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => CheckoutError::PaymentNotFound,
                other => other.into(),
            })?;

        let attempt = match claim {
            Claim::Claimed(attempt) => self.confirm_with_provider(&payments, attempt).await?,
            Claim::Verified(attempt) => {
                tracing::info!(reference = %attempt.reference, "Resuming fulfilment of verified payment");
                attempt
            }
            Claim::InProgress(_) => return Err(CheckoutError::InProgress),
            Claim::Settled(attempt) if needs_reconciling(&attempt) => {
                return Err(self
                    .reconcile_failed(&payments, &attempt)
                    .await
                    .unwrap_or_else(std::convert::identity));
            }
            Claim::Settled(attempt) => return Err(settled_error(&attempt)),
        };

        match payments.fulfil(attempt.id, self.low_stock_threshold).await? {
            Fulfilment::Fulfilled(order) => {
                self.outbox.notify_one();
                tracing::info!(
                    reference = %attempt.reference,
                    order_id = %order.id,
                    total = %order.total,
                    "Payment verified and order created"
                );
                Ok(VerifiedOrder {
                    order_id: order.id,
                    reference: attempt.reference,
                })
            }
            Fulfilment::AlreadyFulfilled(order_id) => Err(CheckoutError::AlreadyVerified(order_id)),
            Fulfilment::Unfulfillable(reason) => {
                payments
                    .compensate(attempt.id, PaymentStatus::Verified, &reason, None)
                    .await?;
                self.outbox.notify_one();
                tracing::error!(
                    reference = %attempt.reference,
                    reason = %reason,
                    "Paid checkout could not be fulfilled, refund queued"
                );
                Err(CheckoutError::Unfulfillable(reason))
            }
        }
    }

    /// Ask the provider about a claimed attempt and record the answer.
    async fn confirm_with_provider(
        &self,
        payments: &PaymentRepository<'_>,
        attempt: PaymentAttempt,
    ) -> Result<PaymentAttempt, CheckoutError> {
        let (transaction, raw) = match self.paystack.verify_transaction(&attempt.reference).await {
            Ok(result) => result,
            Err(e) => {
                if e.is_transient() {
                    tracing::warn!(reference = %attempt.reference, error = %e, "Payment provider unavailable");
                } else {
                    tracing::error!(reference = %attempt.reference, error = %e, "Payment provider rejected verify call");
                }
                payments.release_to_pending(attempt.id).await?;
                return Err(e.into());
            }
        };

        match transaction.outcome() {
            ChargeOutcome::Charged => {}
            ChargeOutcome::Declined => {
                tracing::info!(
                    reference = %attempt.reference,
                    status = %transaction.status,
                    "Payment declined"
                );
                payments
                    .mark_failed(
                        attempt.id,
                        PaymentStatus::Verifying,
                        &format!("Payment verification failed: {}", transaction.status),
                    )
                    .await?;
                return Err(CheckoutError::VerificationFailed);
            }
            ChargeOutcome::Open => {
                tracing::info!(
                    reference = %attempt.reference,
                    status = %transaction.status,
                    "Payment not completed yet"
                );
                payments.release_to_pending(attempt.id).await?;
                return Err(CheckoutError::NotCompleted(transaction.status));
            }
        }

        // Checked before the charge is recorded as verified, so a mismatched
        // charge can never reach fulfilment.
        if let Some(reason) = charge_mismatch(&attempt, transaction.amount, &transaction.currency) {
            payments
                .compensate(attempt.id, PaymentStatus::Verifying, &reason, Some(&raw))
                .await?;
            self.outbox.notify_one();
            tracing::error!(reference = %attempt.reference, reason = %reason, "Charged amount mismatch");
            return Err(CheckoutError::VerificationFailed);
        }

        Ok(payments.mark_verified(attempt.id, &raw).await?)
    }

    /// Ask the provider again about an attempt that failed without ever
    /// recording a charge. If the customer was charged after all, queue a
    /// refund. Returns the error to report for the attempt.
    async fn reconcile_failed(
        &self,
        payments: &PaymentRepository<'_>,
        attempt: &PaymentAttempt,
    ) -> Result<CheckoutError, CheckoutError> {
        let (transaction, raw) = match self.paystack.verify_transaction(&attempt.reference).await {
            Ok(result) => result,
            Err(e) if e.is_transient() => return Err(e.into()),
            // Never reached the provider (initialization failed).
            Err(_) => return Ok(settled_error(attempt)),
        };

        if transaction.outcome() != ChargeOutcome::Charged {
            return Ok(settled_error(attempt));
        }

        let reason = format!(
            "charge succeeded after the payment had failed ({})",
            attempt.failure_reason.as_deref().unwrap_or("no reason recorded")
        );
        if payments.record_late_charge(attempt.id, &raw, &reason).await? {
            self.outbox.notify_one();
            tracing::error!(reference = %attempt.reference, reason = %reason, "Late charge on failed payment, refund queued");
        }
        Ok(CheckoutError::Unfulfillable(reason))
    }
}

/// A failed attempt with no recorded charge may still have been paid.
/// Attempts failed by compensation already carry the provider payload and
/// their refund is queued.
fn needs_reconciling(attempt: &PaymentAttempt) -> bool {
    attempt.status == PaymentStatus::Failed && attempt.provider_payload.is_none()
}

/// Error for an attempt that already reached a terminal status.
fn settled_error(attempt: &PaymentAttempt) -> CheckoutError {
    match attempt.status {
        PaymentStatus::Fulfilled => CheckoutError::AlreadyVerified(attempt.order_id),
        _ => CheckoutError::AlreadyFailed(
            attempt
                .failure_reason
                .clone()
                .unwrap_or_else(|| "Payment failed".to_owned()),
        ),
    }
}

/// Why the provider's charge does not match the attempt, if it doesn't.
fn charge_mismatch(attempt: &PaymentAttempt, amount_minor: i64, currency: &str) -> Option<String> {
    if amount_minor != attempt.amount_minor {
        return Some(format!(
            "amount mismatch: expected {} got {amount_minor}",
            attempt.amount_minor
        ));
    }
    if !currency.eq_ignore_ascii_case(&attempt.currency) {
        return Some(format!(
            "currency mismatch: expected {} got {currency}",
            attempt.currency
        ));
    }
    None
}

/// Fresh provider reference: `tp_<uuid-simple>`.
#[must_use]
pub fn new_reference() -> String {
    format!("tp_{}", Uuid::new_v4().simple())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tradepost_core::{CartId, PaymentId, UserId};

    use super::*;

    fn attempt(status: PaymentStatus) -> PaymentAttempt {
        PaymentAttempt {
            id: PaymentId::new(),
            user_id: UserId::new(),
            cart_id: CartId::new(),
            shipping_address_id: None,
            reference: new_reference(),
            idempotency_key: None,
            amount: Decimal::new(250_000, 2),
            amount_minor: 250_000,
            currency: "NGN".to_owned(),
            status,
            authorization_url: None,
            failure_reason: None,
            provider_payload: None,
            order_id: None,
            claimed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_reference_format() {
        let reference = new_reference();
        assert!(reference.starts_with("tp_"));
        assert_eq!(reference.len(), 3 + 32);
        assert_ne!(reference, new_reference());
    }

    #[test]
    fn test_charge_mismatch() {
        let a = attempt(PaymentStatus::Verified);
        assert_eq!(charge_mismatch(&a, 250_000, "ngn"), None);
        assert!(charge_mismatch(&a, 100, "NGN").unwrap().starts_with("amount mismatch"));
        assert!(charge_mismatch(&a, 250_000, "USD").unwrap().starts_with("currency mismatch"));
    }

    #[test]
    fn test_settled_error() {
        let mut fulfilled = attempt(PaymentStatus::Fulfilled);
        let order_id = OrderId::new();
        fulfilled.order_id = Some(order_id);
        assert!(matches!(
            settled_error(&fulfilled),
            CheckoutError::AlreadyVerified(Some(id)) if id == order_id
        ));

        let mut failed = attempt(PaymentStatus::Failed);
        failed.failure_reason = Some("insufficient stock after payment".to_owned());
        assert_eq!(
            settled_error(&failed).to_string(),
            "insufficient stock after payment"
        );
    }

    #[test]
    fn test_failed_attempt_without_charge_is_reconciled() {
        let declined = attempt(PaymentStatus::Failed);
        assert!(needs_reconciling(&declined));

        let mut refunded = attempt(PaymentStatus::Failed);
        refunded.provider_payload = Some(serde_json::json!({"status": "success"}));
        assert!(!needs_reconciling(&refunded));

        assert!(!needs_reconciling(&attempt(PaymentStatus::Fulfilled)));
    }

    #[test]
    fn test_not_completed_message() {
        let err = CheckoutError::NotCompleted("abandoned".to_owned());
        assert_eq!(err.to_string(), "Payment not completed: abandoned");
    }
}
