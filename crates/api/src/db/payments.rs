//! Payment attempt repository.
//!
//! Persistence for the checkout state machine. Every status write is
//! guarded by the status it expects to move from, and checked against
//! [`PaymentStatus::can_transition_to`], so two workers racing on the same
//! reference cannot both win.
//!
//! The provider is never called while a transaction is open: the workflow
//! claims an attempt (`pending -> verifying`), commits, talks to the
//! provider, then opens a fresh transaction for [`PaymentRepository::fulfil`].
//!
//! A claim is a lease: if its holder disappears (client disconnect, crash,
//! deploy) the attempt stays `verifying` only until [`VERIFY_LEASE_SECS`]
//! have passed, after which the next caller takes it over.

use sqlx::{PgConnection, PgPool};

use tradepost_core::{OrderId, PaymentId, PaymentStatus, ProductId, UserId};

use super::outbox;
use super::{RepositoryError, carts, orders};
use crate::models::order::Order;
use crate::models::outbox::{LowStock, OrderPlaced, OutboxMessage, RefundRequired};
use crate::models::payment::{NewPaymentAttempt, PaymentAttempt};

const ATTEMPT_COLUMNS: &str = "id, user_id, cart_id, shipping_address_id, reference, \
     idempotency_key, amount, amount_minor, currency, status, authorization_url, \
     failure_reason, provider_payload, order_id, claimed_at, created_at, updated_at";

/// How long a `verifying` claim is honoured. Well above the provider
/// request timeout, so a live holder is never overtaken.
pub const VERIFY_LEASE_SECS: f64 = 120.0;

/// Result of trying to start verification on an attempt.
#[derive(Debug)]
pub enum Claim {
    /// The attempt moved `pending -> verifying`; the caller owns it.
    Claimed(PaymentAttempt),
    /// The provider already confirmed the charge but fulfilment never
    /// finished. The caller should go straight to [`PaymentRepository::fulfil`].
    Verified(PaymentAttempt),
    /// Another request holds an unexpired claim.
    InProgress(PaymentAttempt),
    /// Fulfilled or failed; nothing left to do.
    Settled(PaymentAttempt),
}

/// Result of the fulfilment transaction.
#[derive(Debug)]
pub enum Fulfilment {
    /// Order created and attempt fulfilled.
    Fulfilled(Order),
    /// Someone else fulfilled this attempt first.
    AlreadyFulfilled(Option<OrderId>),
    /// The charge succeeded but the order cannot be created. Nothing was
    /// written; the caller must compensate.
    Unfulfillable(String),
}

/// Repository for payment attempt database operations.
pub struct PaymentRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PaymentRepository<'a> {
    /// Create a new payment repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Look up an attempt by provider reference.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<PaymentAttempt>, RepositoryError> {
        let attempt = sqlx::query_as::<_, PaymentAttempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM shop.payment_attempt WHERE reference = $1"
        ))
        .bind(reference)
        .fetch_optional(self.pool)
        .await?;
        Ok(attempt)
    }

    /// The attempt a user created with an idempotency key, if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_idempotency_key(
        &self,
        user_id: UserId,
        key: &str,
    ) -> Result<Option<PaymentAttempt>, RepositoryError> {
        let attempt = sqlx::query_as::<_, PaymentAttempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM shop.payment_attempt \
             WHERE user_id = $1 AND idempotency_key = $2"
        ))
        .bind(user_id)
        .bind(key)
        .fetch_optional(self.pool)
        .await?;
        Ok(attempt)
    }

    /// Insert a fresh `pending` attempt.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the idempotency key is already
    /// in use by this user.
    pub async fn insert_pending(
        &self,
        new: &NewPaymentAttempt,
    ) -> Result<PaymentAttempt, RepositoryError> {
        let attempt = sqlx::query_as::<_, PaymentAttempt>(&format!(
            r"
            INSERT INTO shop.payment_attempt
                (id, user_id, cart_id, shipping_address_id, reference, idempotency_key,
                 amount, amount_minor, currency, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {ATTEMPT_COLUMNS}
            "
        ))
        .bind(PaymentId::new())
        .bind(new.user_id)
        .bind(new.cart_id)
        .bind(new.shipping_address_id)
        .bind(&new.reference)
        .bind(new.idempotency_key.as_deref())
        .bind(new.amount)
        .bind(new.amount_minor)
        .bind(&new.currency)
        .bind(PaymentStatus::Pending)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::on_unique(e, "Idempotency key already used"))?;
        Ok(attempt)
    }

    /// Record the provider's checkout URL.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the attempt does not exist.
    pub async fn set_authorization_url(
        &self,
        id: PaymentId,
        url: &str,
    ) -> Result<PaymentAttempt, RepositoryError> {
        let attempt = sqlx::query_as::<_, PaymentAttempt>(&format!(
            "UPDATE shop.payment_attempt SET authorization_url = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {ATTEMPT_COLUMNS}"
        ))
        .bind(id)
        .bind(url)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;
        Ok(attempt)
    }

    /// Move an attempt from `from` to `failed` with a reason.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the attempt is no longer in `from`.
    pub async fn mark_failed(
        &self,
        id: PaymentId,
        from: PaymentStatus,
        reason: &str,
    ) -> Result<PaymentAttempt, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        transition(&mut *conn, id, from, PaymentStatus::Failed, Some(reason), None).await
    }

    /// Start verification: lock the row and move `pending -> verifying`.
    ///
    /// A `verifying` attempt whose claim has outlived [`VERIFY_LEASE_SECS`]
    /// is taken over rather than reported as in progress.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown reference.
    pub async fn claim_for_verification(&self, reference: &str) -> Result<Claim, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let attempt = sqlx::query_as::<_, PaymentAttempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM shop.payment_attempt WHERE reference = $1 FOR UPDATE"
        ))
        .bind(reference)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        let claim = match attempt.status {
            PaymentStatus::Pending => {
                let claimed = stamp_claim(&mut *tx, attempt.id, PaymentStatus::Pending)
                    .await?
                    .ok_or_else(|| RepositoryError::Conflict("Payment is no longer pending".to_owned()))?;
                Claim::Claimed(claimed)
            }
            PaymentStatus::Verifying => {
                match stamp_claim(&mut *tx, attempt.id, PaymentStatus::Verifying).await? {
                    Some(reclaimed) => {
                        tracing::warn!(
                            reference = %reclaimed.reference,
                            claimed_at = ?attempt.claimed_at,
                            "Taking over expired verification claim"
                        );
                        Claim::Claimed(reclaimed)
                    }
                    None => Claim::InProgress(attempt),
                }
            }
            PaymentStatus::Verified => Claim::Verified(attempt),
            PaymentStatus::Failed | PaymentStatus::Fulfilled => Claim::Settled(attempt),
        };

        tx.commit().await?;
        Ok(claim)
    }

    /// Give a claimed attempt back after the provider could not be reached.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the attempt is not `verifying`.
    pub async fn release_to_pending(&self, id: PaymentId) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        transition(
            &mut *conn,
            id,
            PaymentStatus::Verifying,
            PaymentStatus::Pending,
            None,
            None,
        )
        .await?;
        Ok(())
    }

    /// Record a confirmed charge: `verifying -> verified`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the attempt is not `verifying`.
    pub async fn mark_verified(
        &self,
        id: PaymentId,
        provider_payload: &serde_json::Value,
    ) -> Result<PaymentAttempt, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        transition(
            &mut *conn,
            id,
            PaymentStatus::Verifying,
            PaymentStatus::Verified,
            None,
            Some(provider_payload),
        )
        .await
    }

    /// Turn a verified attempt into a paid order.
    ///
    /// In one transaction: lock the attempt, copy the cart into an order,
    /// take stock with a guarded decrement, clear the cart, queue
    /// `order_placed` and any `low_stock` events, and mark the attempt
    /// fulfilled. If any line cannot be covered the transaction is dropped
    /// and [`Fulfilment::Unfulfillable`] is returned.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the attempt does not exist.
    pub async fn fulfil(
        &self,
        id: PaymentId,
        low_stock_threshold: i32,
    ) -> Result<Fulfilment, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let attempt = sqlx::query_as::<_, PaymentAttempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM shop.payment_attempt WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        match attempt.status {
            PaymentStatus::Verified => {}
            PaymentStatus::Fulfilled => return Ok(Fulfilment::AlreadyFulfilled(attempt.order_id)),
            other => {
                return Err(RepositoryError::Conflict(format!(
                    "Payment is {other}, not verified"
                )));
            }
        }

        let items = carts::lines(&mut *tx, attempt.cart_id).await?;
        if items.is_empty() {
            return Ok(Fulfilment::Unfulfillable("cart was emptied after payment".to_owned()));
        }

        let total = carts::line_total(items.iter().map(|i| (i.quantity, i.price)))?;
        if total != attempt.amount {
            return Ok(Fulfilment::Unfulfillable(format!(
                "cart total {total} no longer matches amount paid {}",
                attempt.amount
            )));
        }

        let lines: Vec<(ProductId, i32, _)> = items
            .iter()
            .map(|i| (i.product_id, i.quantity, i.price))
            .collect();

        let mut low_stock = Vec::new();
        for (product_id, quantity, _) in &lines {
            let Some((name, remaining)) = take_stock(&mut *tx, *product_id, *quantity).await? else {
                tracing::warn!(
                    reference = %attempt.reference,
                    product_id = %product_id,
                    quantity,
                    "Stock guard rejected line after payment"
                );
                return Ok(Fulfilment::Unfulfillable(
                    "insufficient stock after payment".to_owned(),
                ));
            };
            if remaining <= low_stock_threshold {
                low_stock.push(LowStock {
                    product_id: *product_id,
                    product_name: name,
                    stock: remaining,
                });
            }
        }

        let order = orders::insert(
            &mut *tx,
            attempt.user_id,
            attempt.shipping_address_id,
            &attempt.reference,
            total,
            &lines,
        )
        .await?;

        carts::clear(&mut *tx, attempt.cart_id).await?;

        outbox::enqueue(
            &mut *tx,
            &OutboxMessage::OrderPlaced(OrderPlaced {
                order_id: order.id,
                user_id: order.user_id,
                total: order.total,
            }),
        )
        .await?;
        for alert in low_stock {
            outbox::enqueue(&mut *tx, &OutboxMessage::LowStock(alert)).await?;
        }

        sqlx::query(
            "UPDATE shop.payment_attempt SET status = $2, order_id = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(attempt.id)
        .bind(PaymentStatus::Fulfilled)
        .bind(order.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Fulfilment::Fulfilled(order))
    }

    /// Fail an attempt the customer was charged for and queue a refund for
    /// an admin, in one transaction.
    ///
    /// `from` is `verified` when fulfilment could not complete, or
    /// `verifying` when the provider's charge did not match the attempt.
    /// `provider_payload` records the charge when it was not stored yet.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the attempt is no longer in `from`.
    pub async fn compensate(
        &self,
        id: PaymentId,
        from: PaymentStatus,
        reason: &str,
        provider_payload: Option<&serde_json::Value>,
    ) -> Result<PaymentAttempt, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let attempt = transition(
            &mut *tx,
            id,
            from,
            PaymentStatus::Failed,
            Some(reason),
            provider_payload,
        )
        .await?;
        queue_refund(&mut *tx, &attempt, reason).await?;

        tx.commit().await?;
        Ok(attempt)
    }

    /// Record a successful charge that arrived after the attempt had
    /// already failed, and queue a refund for it.
    ///
    /// Only an attempt that never stored a provider payload qualifies, so
    /// a charge is refunded at most once. Returns `false` when another call
    /// already recorded it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    pub async fn record_late_charge(
        &self,
        id: PaymentId,
        provider_payload: &serde_json::Value,
        reason: &str,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let attempt = sqlx::query_as::<_, PaymentAttempt>(&format!(
            r"
            UPDATE shop.payment_attempt
            SET provider_payload = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2 AND provider_payload IS NULL
            RETURNING {ATTEMPT_COLUMNS}
            "
        ))
        .bind(id)
        .bind(PaymentStatus::Failed)
        .bind(provider_payload)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(attempt) = attempt else {
            return Ok(false);
        };
        queue_refund(&mut *tx, &attempt, reason).await?;

        tx.commit().await?;
        Ok(true)
    }
}

async fn queue_refund(
    conn: &mut PgConnection,
    attempt: &PaymentAttempt,
    reason: &str,
) -> Result<(), RepositoryError> {
    outbox::enqueue(
        conn,
        &OutboxMessage::RefundRequired(RefundRequired {
            reference: attempt.reference.clone(),
            user_id: attempt.user_id,
            amount: attempt.amount,
            currency: attempt.currency.clone(),
            reason: reason.to_owned(),
        }),
    )
    .await?;
    Ok(())
}

/// Move an attempt into `verifying` and stamp the claim time.
///
/// From `pending` this always succeeds while the row is still pending. From
/// `verifying` it only succeeds once the previous claim has expired.
async fn stamp_claim(
    conn: &mut PgConnection,
    id: PaymentId,
    from: PaymentStatus,
) -> Result<Option<PaymentAttempt>, RepositoryError> {
    if from != PaymentStatus::Verifying {
        from.transition_to(PaymentStatus::Verifying)
            .map_err(|e| RepositoryError::Conflict(format!("Payment {e}")))?;
    }

    let attempt = sqlx::query_as::<_, PaymentAttempt>(&format!(
        r"
        UPDATE shop.payment_attempt
        SET status = $3, claimed_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND status = $2
          AND ($2 <> $3
               OR claimed_at IS NULL
               OR claimed_at < NOW() - make_interval(secs => $4))
        RETURNING {ATTEMPT_COLUMNS}
        "
    ))
    .bind(id)
    .bind(from)
    .bind(PaymentStatus::Verifying)
    .bind(VERIFY_LEASE_SECS)
    .fetch_optional(conn)
    .await?;
    Ok(attempt)
}

/// Guarded status write. Only succeeds if the row is still in `from`.
async fn transition(
    conn: &mut PgConnection,
    id: PaymentId,
    from: PaymentStatus,
    to: PaymentStatus,
    failure_reason: Option<&str>,
    provider_payload: Option<&serde_json::Value>,
) -> Result<PaymentAttempt, RepositoryError> {
    from.transition_to(to)
        .map_err(|e| RepositoryError::Conflict(format!("Payment {e}")))?;

    sqlx::query_as::<_, PaymentAttempt>(&format!(
        r"
        UPDATE shop.payment_attempt
        SET status = $3,
            failure_reason = COALESCE($4, failure_reason),
            provider_payload = COALESCE($5, provider_payload),
            updated_at = NOW()
        WHERE id = $1 AND status = $2
        RETURNING {ATTEMPT_COLUMNS}
        "
    ))
    .bind(id)
    .bind(from)
    .bind(to)
    .bind(failure_reason)
    .bind(provider_payload)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| RepositoryError::Conflict(format!("Payment is no longer {from}")))
}

/// Decrement stock if enough remains. Returns the product name and the new
/// stock, or `None` when the guard rejects the update.
async fn take_stock(
    conn: &mut PgConnection,
    product_id: ProductId,
    quantity: i32,
) -> Result<Option<(String, i32)>, RepositoryError> {
    let row: Option<(String, i32)> = sqlx::query_as(
        r"
        UPDATE shop.product
        SET stock = stock - $2, updated_at = NOW()
        WHERE id = $1 AND stock >= $2
        RETURNING name, stock
        ",
    )
    .bind(product_id)
    .bind(quantity)
    .fetch_optional(conn)
    .await?;
    Ok(row)
}
