//! Transactional outbox.
//!
//! Events are written with [`enqueue`] inside the same transaction as the
//! change that caused them. The worker claims them with a short lease, so a
//! crashed worker's events become visible again once the lease runs out.

use std::time::Duration;

use sqlx::{PgConnection, PgPool};

use tradepost_core::OutboxEventId;

use super::RepositoryError;
use crate::models::outbox::{OutboxEvent, OutboxMessage};

/// Longest delay between delivery attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);

/// How long a claimed event stays invisible to other workers.
const CLAIM_LEASE_SECS: i64 = 120;

/// Write an event in the caller's transaction.
///
/// # Errors
///
/// Returns `RepositoryError::DataCorruption` if the payload cannot be
/// serialized, or `RepositoryError::Database` if the insert fails.
pub async fn enqueue(
    conn: &mut PgConnection,
    message: &OutboxMessage,
) -> Result<OutboxEventId, RepositoryError> {
    let payload = message
        .payload()
        .map_err(|e| RepositoryError::DataCorruption(format!("outbox payload: {e}")))?;
    let id = OutboxEventId::new();

    sqlx::query("INSERT INTO shop.outbox_event (id, event_type, payload) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(message.event_type())
        .bind(payload)
        .execute(conn)
        .await?;
    Ok(id)
}

/// Delay before retry number `attempts + 1`: `2^attempts` seconds, capped.
#[must_use]
pub fn backoff(attempts: i32) -> Duration {
    let exponent = u32::try_from(attempts.clamp(0, 31)).unwrap_or(31);
    Duration::from_secs(2_u64.saturating_pow(exponent)).min(MAX_BACKOFF)
}

/// Repository used by the outbox worker.
pub struct OutboxRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OutboxRepository<'a> {
    /// Create a new outbox repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Claim up to `limit` due events that have attempts left.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn claim_batch(
        &self,
        limit: i64,
        max_attempts: i32,
    ) -> Result<Vec<OutboxEvent>, RepositoryError> {
        let events = sqlx::query_as::<_, OutboxEvent>(
            r"
            UPDATE shop.outbox_event
            SET available_at = NOW() + make_interval(secs => $3::float8)
            WHERE id IN (
                SELECT id FROM shop.outbox_event
                WHERE processed_at IS NULL AND attempts < $2 AND available_at <= NOW()
                ORDER BY created_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, event_type, payload, attempts, last_error,
                      available_at, processed_at, created_at
            ",
        )
        .bind(limit)
        .bind(max_attempts)
        .bind(CLAIM_LEASE_SECS)
        .fetch_all(self.pool)
        .await?;
        Ok(events)
    }

    /// Mark an event delivered.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn complete(&self, id: OutboxEventId) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE shop.outbox_event SET processed_at = NOW(), last_error = NULL WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Record a failed delivery and schedule the next attempt.
    ///
    /// Returns the new attempt count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn release(&self, id: OutboxEventId, error: &str) -> Result<i32, RepositoryError> {
        let attempts: i32 = sqlx::query_scalar(
            "UPDATE shop.outbox_event SET attempts = attempts + 1 WHERE id = $1 RETURNING attempts",
        )
        .bind(id)
        .fetch_one(self.pool)
        .await?;

        let delay = i64::try_from(backoff(attempts).as_secs()).unwrap_or(i64::MAX);
        sqlx::query(
            r"
            UPDATE shop.outbox_event
            SET last_error = $2, available_at = NOW() + make_interval(secs => $3::float8)
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(error)
        .bind(delay)
        .execute(self.pool)
        .await?;
        Ok(attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff(0), Duration::from_secs(1));
        assert_eq!(backoff(1), Duration::from_secs(2));
        assert_eq!(backoff(5), Duration::from_secs(32));
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(backoff(12), MAX_BACKOFF);
        assert_eq!(backoff(i32::MAX), MAX_BACKOFF);
        assert_eq!(backoff(-3), Duration::from_secs(1));
    }
}
