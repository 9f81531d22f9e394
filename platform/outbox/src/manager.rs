use crate::model::NewOutboxEvent;
use sqlx::{Postgres, Transaction};

/// Writes outbox rows into the caller's own transaction.
///
/// Each module owns its own outbox table (`<module>_events_outbox`) so
/// the row lands in the exact same database transaction as the
/// business state change it accompanies: if and only if that
/// transaction commits does the event become visible to the relay.
pub struct OutboxManager {
    table: &'static str,
}

impl OutboxManager {
    pub fn new(table: &'static str) -> Self {
        Self { table }
    }

    /// Insert a `PENDING` row. The caller is responsible for committing
    /// (or rolling back) `tx`; this function performs no commit itself.
    /// Returns `false` when `event.event_id` already exists (a
    /// deterministic id colliding with a row from a prior attempt) so
    /// callers using deterministic ids can treat that as "already
    /// handled" rather than inserting a second time.
    pub async fn create_event(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: NewOutboxEvent,
    ) -> Result<bool, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO {} (
                event_id, aggregate_id, aggregate_type, event_type, payload,
                routing_key, correlation_id, causation_id, service,
                status, retry_count, max_retries, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'PENDING', 0, $10, NOW())
            ON CONFLICT (event_id) DO NOTHING
            "#,
            self.table
        );

        let result = sqlx::query(&query)
            .bind(event.event_id)
            .bind(&event.aggregate_id)
            .bind(&event.aggregate_type)
            .bind(&event.event_type)
            .bind(&event.payload)
            .bind(&event.routing_key)
            .bind(&event.metadata.correlation_id)
            .bind(&event.metadata.causation_id)
            .bind(&event.metadata.service)
            .bind(event.max_retries)
            .execute(&mut **tx)
            .await?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            tracing::debug!(
                event_id = %event.event_id,
                event_type = %event.event_type,
                table = self.table,
                "event enqueued to outbox"
            );
        } else {
            tracing::debug!(
                event_id = %event.event_id,
                event_type = %event.event_type,
                table = self.table,
                "event_id already present in outbox, skipping duplicate insert"
            );
        }

        Ok(inserted)
    }
}

/// DDL template for a module's outbox table. `{table}` is substituted
/// by the calling migration with the module-specific table name (e.g.
/// `orders_events_outbox`). The unique constraint on `event_id` is what
/// makes deterministic event IDs work as a second line of duplicate
/// suppression, on top of the relay's own claim step.
pub const OUTBOX_TABLE_TEMPLATE: &str = r#"
CREATE TABLE IF NOT EXISTS {table} (
    id BIGSERIAL PRIMARY KEY,
    event_id UUID NOT NULL UNIQUE,
    aggregate_id TEXT NOT NULL,
    aggregate_type TEXT NOT NULL,
    event_type TEXT NOT NULL,
    payload JSONB NOT NULL,
    routing_key TEXT NOT NULL,
    correlation_id TEXT,
    causation_id TEXT,
    service TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'PENDING',
    retry_count INT NOT NULL DEFAULT 0,
    max_retries INT NOT NULL DEFAULT 3,
    last_error TEXT,
    lease_expires_at TIMESTAMP,
    next_attempt_at TIMESTAMP,
    published_at TIMESTAMP,
    created_at TIMESTAMP NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS {table}_status_created_idx ON {table} (status, created_at, id);
"#;
