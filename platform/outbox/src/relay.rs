use crate::metrics::{OUTBOX_DEAD_LETTERED_TOTAL, OUTBOX_PUBLISHED_TOTAL, OUTBOX_PUBLISH_FAILURES_TOTAL};
use crate::model::OutboxRow;
use chrono::{Duration as ChronoDuration, Utc};
use event_bus::EventBus;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Polls a module's outbox table, claims a batch, publishes each row to
/// the broker, and marks the outcome. One relay instance per table;
/// several instances may run concurrently against the same table
/// (e.g. during a rolling deploy) since claiming uses `FOR UPDATE SKIP
/// LOCKED` rather than a global leader election.
pub struct Relay {
    pool: PgPool,
    bus: Arc<dyn EventBus>,
    table: &'static str,
    batch_size: i64,
    lease_duration: Duration,
}

impl Relay {
    pub fn new(pool: PgPool, bus: Arc<dyn EventBus>, table: &'static str) -> Self {
        Self {
            pool,
            bus,
            table,
            batch_size: 100,
            lease_duration: Duration::from_secs(30),
        }
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_lease_duration(mut self, lease_duration: Duration) -> Self {
        self.lease_duration = lease_duration;
        self
    }

    /// Claim up to `batch_size` rows that are either `PENDING` or whose
    /// `next_attempt_at` backoff has elapsed, flipping them to
    /// `PUBLISHING` with a fresh lease so a second relay instance
    /// polling at the same moment skips them instead of double-claiming.
    async fn claim_batch(&self) -> Result<Vec<OutboxRow>, RelayError> {
        let query = format!(
            r#"
            UPDATE {table}
            SET status = 'PUBLISHING', lease_expires_at = NOW() + ($1 || ' seconds')::interval
            WHERE id IN (
                SELECT id FROM {table}
                WHERE (status = 'PENDING' OR (status = 'PUBLISHING' AND lease_expires_at < NOW()))
                  AND (next_attempt_at IS NULL OR next_attempt_at <= NOW())
                ORDER BY created_at, id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
            table = self.table
        );

        let rows: Vec<OutboxRow> = sqlx::query_as(&query)
            .bind(self.lease_duration.as_secs() as i64)
            .bind(self.batch_size)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn mark_published(&self, row_id: i64) -> Result<(), RelayError> {
        let query = format!(
            "UPDATE {} SET status = 'PUBLISHED', published_at = NOW() WHERE id = $1",
            self.table
        );
        sqlx::query(&query).bind(row_id).execute(&self.pool).await?;
        Ok(())
    }

    /// Record a failed publish attempt. If the row has retries left,
    /// schedule the next attempt with exponential backoff plus jitter
    /// and flip it back to `PENDING`; otherwise mark it `FAILED` for
    /// manual/alerted follow-up.
    async fn mark_failed(&self, row: &OutboxRow, error: &str) -> Result<(), RelayError> {
        let retry_count = row.retry_count + 1;

        if retry_count > row.max_retries {
            let query = format!(
                "UPDATE {} SET status = 'FAILED', retry_count = $1, last_error = $2 WHERE id = $3",
                self.table
            );
            sqlx::query(&query)
                .bind(retry_count)
                .bind(error)
                .bind(row.id)
                .execute(&self.pool)
                .await?;

            OUTBOX_DEAD_LETTERED_TOTAL
                .with_label_values(&[self.table, &row.event_type])
                .inc();
            tracing::error!(
                event_id = %row.event_id,
                event_type = %row.event_type,
                table = self.table,
                retry_count,
                "outbox row exhausted retries, marking failed"
            );
        } else {
            let delay = backoff_with_jitter(retry_count);
            let query = format!(
                "UPDATE {} SET status = 'PENDING', retry_count = $1, last_error = $2, \
                 next_attempt_at = NOW() + ($3 || ' milliseconds')::interval WHERE id = $4",
                self.table
            );
            sqlx::query(&query)
                .bind(retry_count)
                .bind(error)
                .bind(delay.as_millis() as i64)
                .bind(row.id)
                .execute(&self.pool)
                .await?;

            tracing::warn!(
                event_id = %row.event_id,
                event_type = %row.event_type,
                table = self.table,
                retry_count,
                delay_ms = delay.as_millis() as u64,
                error,
                "outbox publish failed, will retry"
            );
        }

        OUTBOX_PUBLISH_FAILURES_TOTAL
            .with_label_values(&[self.table, &row.event_type])
            .inc();

        Ok(())
    }

    /// Claim one batch and publish it. Returns the number of rows
    /// successfully published.
    pub async fn drain_once(&self) -> Result<usize, RelayError> {
        let rows = self.claim_batch().await?;
        let mut published = 0;

        for row in &rows {
            let frame = row.to_broker_frame();
            let payload = match serde_json::to_vec(&frame) {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.mark_failed(row, &format!("serialization error: {e}")).await?;
                    continue;
                }
            };
            match self.bus.publish(&row.routing_key, payload).await {
                Ok(()) => {
                    self.mark_published(row.id).await?;
                    OUTBOX_PUBLISHED_TOTAL
                        .with_label_values(&[self.table, &row.event_type])
                        .inc();
                    published += 1;
                }
                Err(e) => {
                    self.mark_failed(row, &e.to_string()).await?;
                }
            }
        }

        Ok(published)
    }

    /// Run `drain_once` on a fixed interval until the process exits.
    /// Errors from a single drain (e.g. a transient DB outage) are
    /// logged and the loop keeps going rather than exiting.
    pub async fn run(&self, poll_interval: Duration) -> ! {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            ticker.tick().await;
            match self.drain_once().await {
                Ok(n) if n > 0 => tracing::debug!(published = n, table = self.table, "relay drained batch"),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, table = self.table, "relay drain failed"),
            }
        }
    }

    /// Delete rows that have sat in `PUBLISHED` for longer than
    /// `retention`. Intended to be called periodically by the same
    /// process running `run`, on a much slower cadence.
    pub async fn gc_published(&self, retention: ChronoDuration) -> Result<u64, RelayError> {
        let cutoff = Utc::now() - retention;
        let query = format!("DELETE FROM {} WHERE status = 'PUBLISHED' AND published_at < $1", self.table);
        let result = sqlx::query(&query)
            .bind(cutoff.naive_utc())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Rows currently in `FAILED` state, for an operator dashboard or a
    /// manual replay tool. Not part of the automatic retry path.
    pub async fn dead_lettered(&self, limit: i64) -> Result<Vec<OutboxRow>, RelayError> {
        let query = format!(
            "SELECT * FROM {} WHERE status = 'FAILED' ORDER BY created_at DESC LIMIT $1",
            self.table
        );
        let rows = sqlx::query_as(&query).bind(limit).fetch_all(&self.pool).await?;
        Ok(rows)
    }

    /// Requeue a single dead-lettered row for another attempt, resetting
    /// its retry counter. Used by an operator-triggered replay.
    pub async fn requeue(&self, event_id: Uuid) -> Result<(), RelayError> {
        let query = format!(
            "UPDATE {} SET status = 'PENDING', retry_count = 0, next_attempt_at = NULL \
             WHERE event_id = $1 AND status = 'FAILED'",
            self.table
        );
        sqlx::query(&query).bind(event_id).execute(&self.pool).await?;
        Ok(())
    }
}

/// `base * 2^attempt`, capped at 30s, with +/-25% jitter so a burst of
/// rows that fail together don't all retry in lockstep.
fn backoff_with_jitter(attempt: i32) -> Duration {
    const BASE_MS: u64 = 500;
    const CAP_MS: u64 = 30_000;

    let exp = BASE_MS.saturating_mul(1u64 << attempt.clamp(0, 10) as u32);
    let capped = exp.min(CAP_MS);
    let jitter_span = capped / 4;
    let jitter = fastrand::u64(0..=jitter_span.max(1));
    let signed = if fastrand::bool() {
        capped.saturating_add(jitter)
    } else {
        capped.saturating_sub(jitter)
    };

    Duration::from_millis(signed.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_with_attempt_and_stays_capped() {
        let first = backoff_with_jitter(1);
        let tenth = backoff_with_jitter(10);
        assert!(first.as_millis() < tenth.as_millis());
        assert!(tenth.as_millis() <= 30_000 + 30_000 / 4);
    }

    #[test]
    fn backoff_never_zero() {
        for attempt in 0..5 {
            assert!(backoff_with_jitter(attempt).as_millis() > 0);
        }
    }
}
