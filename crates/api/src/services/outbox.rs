//! Outbox delivery worker.
//!
//! Polls `shop.outbox_event` on an interval, and immediately when a
//! request handler wakes it through the shared [`Notify`] after a commit.
//! Each event is delivered (email, admin alert) and then marked processed.
//! A failed delivery is released with exponential backoff until
//! `OUTBOX_MAX_ATTEMPTS` is reached, after which the row stays as a
//! dead letter for an operator to inspect.

use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::config::OutboxConfig;
use crate::db::{OrderRepository, OutboxRepository, RepositoryError, UserRepository};
use crate::models::outbox::{
    LowStock, OrderPlaced, OrderStatusChanged, OutboxEvent, OutboxMessage, RefundRequired,
};
use crate::services::alerts::{AlertEvent, AlertHub};
use crate::services::email::{EmailError, EmailLine, EmailService};

/// Events claimed per poll.
pub const BATCH_SIZE: i64 = 20;

/// Why a delivery failed.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Email(#[from] EmailError),

    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// Nobody could be told; the event stays queued.
    #[error("no admin to notify about refund {0}")]
    NoRecipient(String),
}

/// Counters for one drain pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainStats {
    pub delivered: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Delivers outbox events.
#[derive(Clone)]
pub struct OutboxWorker {
    pool: PgPool,
    email: EmailService,
    alerts: AlertHub,
    notify: Arc<Notify>,
    config: OutboxConfig,
}

impl OutboxWorker {
    /// Create a worker.
    #[must_use]
    pub const fn new(
        pool: PgPool,
        email: EmailService,
        alerts: AlertHub,
        notify: Arc<Notify>,
        config: OutboxConfig,
    ) -> Self {
        Self {
            pool,
            email,
            alerts,
            notify,
            config,
        }
    }

    /// Run the worker loop on a background task until `shutdown` flips to
    /// `true` (or its sender is dropped).
    #[must_use]
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                poll_interval_secs = self.config.poll_interval.as_secs(),
                max_attempts = self.config.max_attempts,
                "Outbox worker started"
            );

            loop {
                tokio::select! {
                    biased;
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {}
                    () = self.notify.notified() => {}
                }

                self.drain().await;
            }

            info!("Outbox worker stopped");
        })
    }

    /// Claim and deliver batches until the outbox has nothing due.
    pub async fn drain(&self) -> DrainStats {
        let mut total = DrainStats::default();
        loop {
            match self.run_batch().await {
                Ok((stats, claimed)) => {
                    total.delivered += stats.delivered;
                    total.failed += stats.failed;
                    total.skipped += stats.skipped;
                    if claimed < BATCH_SIZE {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to claim outbox events");
                    break;
                }
            }
        }

        if total != DrainStats::default() {
            debug!(
                delivered = total.delivered,
                failed = total.failed,
                skipped = total.skipped,
                "Outbox drained"
            );
        }
        total
    }

    async fn run_batch(&self) -> Result<(DrainStats, i64), RepositoryError> {
        let repo = OutboxRepository::new(&self.pool);
        let events = repo
            .claim_batch(BATCH_SIZE, self.config.max_attempts)
            .await?;
        let claimed = i64::try_from(events.len()).unwrap_or(BATCH_SIZE);

        let mut stats = DrainStats::default();
        for event in events {
            match self.process(&event).await {
                Ok(true) => {
                    repo.complete(event.id).await?;
                    stats.delivered += 1;
                }
                Ok(false) => {
                    repo.complete(event.id).await?;
                    stats.skipped += 1;
                }
                Err(e) => {
                    let attempts = repo.release(event.id, &e.to_string()).await?;
                    stats.failed += 1;
                    if attempts >= self.config.max_attempts {
                        error!(
                            event_id = %event.id,
                            event_type = %event.event_type,
                            attempts,
                            error = %e,
                            "Outbox event gave up after max attempts"
                        );
                    } else {
                        warn!(
                            event_id = %event.id,
                            event_type = %event.event_type,
                            attempts,
                            error = %e,
                            "Outbox delivery failed, will retry"
                        );
                    }
                }
            }
        }
        Ok((stats, claimed))
    }

    /// Deliver one event. `Ok(false)` means the type is unknown and the
    /// event was skipped.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    async fn process(&self, event: &OutboxEvent) -> Result<bool, DispatchError> {
        let Some(message) = OutboxMessage::decode(&event.event_type, event.payload.clone())? else {
            warn!("Unknown outbox event type, marking processed");
            return Ok(false);
        };

        match message {
            OutboxMessage::OrderPlaced(p) => self.order_placed(p).await?,
            OutboxMessage::OrderStatusChanged(p) => self.order_status_changed(p).await?,
            OutboxMessage::LowStock(p) => self.low_stock(p).await?,
            OutboxMessage::RefundRequired(p) => self.refund_required(p).await?,
        }
        Ok(true)
    }

    async fn order_placed(&self, event: OrderPlaced) -> Result<(), DispatchError> {
        let detail = OrderRepository::new(&self.pool).detail(event.order_id).await?;

        match UserRepository::new(&self.pool).get_by_id(event.user_id).await? {
            Some(user) => {
                let items: Vec<EmailLine> = detail
                    .items
                    .iter()
                    .map(|line| EmailLine {
                        name: line.product.name.clone(),
                        quantity: line.item.quantity,
                        price: line.item.price,
                    })
                    .collect();
                self.email
                    .send_order_confirmation(
                        user.email.as_str(),
                        &user.name,
                        event.order_id,
                        &items,
                        detail.order.total,
                    )
                    .await?;
            }
            None => warn!(user_id = %event.user_id, "Customer gone, skipping order confirmation"),
        }

        self.alerts.publish(AlertEvent::NewOrder {
            message: "New order placed".to_owned(),
            order_id: event.order_id,
            total: event.total,
        });
        Ok(())
    }

    async fn order_status_changed(&self, event: OrderStatusChanged) -> Result<(), DispatchError> {
        let Some(user) = UserRepository::new(&self.pool).get_by_id(event.user_id).await? else {
            warn!(user_id = %event.user_id, "Customer gone, skipping status email");
            return Ok(());
        };

        self.email
            .send_order_status_update(user.email.as_str(), &user.name, event.order_id, event.status)
            .await?;
        Ok(())
    }

    async fn low_stock(&self, event: LowStock) -> Result<(), DispatchError> {
        let admins = UserRepository::new(&self.pool).admin_emails().await?;
        for admin in &admins {
            self.email
                .send_low_stock_alert(
                    admin.as_str(),
                    event.product_id,
                    &event.product_name,
                    event.stock,
                )
                .await?;
        }

        self.alerts.publish(AlertEvent::LowStock {
            message: format!("Low stock: {} has {} left", event.product_name, event.stock),
            product_id: event.product_id,
            product_name: event.product_name,
            stock: event.stock,
        });
        Ok(())
    }

    /// Email every admin, then alert connected ones. The event is only
    /// done once somebody has been told.
    async fn refund_required(&self, event: RefundRequired) -> Result<(), DispatchError> {
        let admins = UserRepository::new(&self.pool).admin_emails().await?;
        for admin in &admins {
            self.email
                .send_refund_required(
                    admin.as_str(),
                    &event.reference,
                    event.amount,
                    &event.currency,
                    &event.reason,
                )
                .await?;
        }

        let receivers = self.alerts.publish(AlertEvent::RefundRequired {
            message: "Refund required".to_owned(),
            reference: event.reference.clone(),
            amount: event.amount,
            currency: event.currency,
            reason: event.reason,
        });

        ensure_notified(&event.reference, admins.len(), receivers)
    }
}

/// A refund nobody heard about must stay in the outbox.
fn ensure_notified(reference: &str, emailed: usize, alerted: usize) -> Result<(), DispatchError> {
    if emailed == 0 && alerted == 0 {
        return Err(DispatchError::NoRecipient(reference.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_error_messages() {
        let err: DispatchError = serde_json::from_str::<OrderPlaced>("{}").unwrap_err().into();
        assert!(err.to_string().starts_with("malformed payload"));

        let err: DispatchError = RepositoryError::NotFound.into();
        assert_eq!(err.to_string(), "not found");
    }

    #[test]
    fn test_refund_without_any_admin_stays_queued() {
        let err = ensure_notified("tp_abc", 0, 0).unwrap_err();
        assert!(matches!(err, DispatchError::NoRecipient(ref r) if r == "tp_abc"));

        assert!(ensure_notified("tp_abc", 1, 0).is_ok());
        assert!(ensure_notified("tp_abc", 0, 2).is_ok());
    }

    #[test]
    fn test_drain_stats_default_is_empty() {
        let stats = DrainStats::default();
        assert_eq!(stats.delivered + stats.failed + stats.skipped, 0);
    }
}
