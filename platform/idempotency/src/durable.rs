use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Durable processed-message marker, in the same Postgres database as
/// business rows. Each module creates its own `<module>_processed_events`
/// table with this shape via its own migrations.
pub struct DurableIdempotency<'a> {
    pool: &'a PgPool,
    /// e.g. `"payments_processed_events"` — each module owns its own
    /// table so the marker lives in the same database/transaction
    /// scope as the rows it protects.
    table: &'static str,
}

impl<'a> DurableIdempotency<'a> {
    pub fn new(pool: &'a PgPool, table: &'static str) -> Self {
        Self { pool, table }
    }

    /// `true` if a live (non-expired) marker exists for `(event_type, id)`.
    pub async fn is_processed(&self, event_type: &str, id: &str) -> Result<bool, sqlx::Error> {
        let query = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE event_type = $1 AND business_id = $2 AND expires_at > NOW())",
            self.table
        );
        let exists: (bool,) = sqlx::query_as(&query)
            .bind(event_type)
            .bind(id)
            .fetch_one(self.pool)
            .await?;
        Ok(exists.0)
    }

    /// Write-through marker, called after a handler has successfully
    /// committed its business-side effects. `ON CONFLICT DO NOTHING`
    /// makes this safe to call more than once for the same key.
    pub async fn mark_processed(
        &self,
        event_type: &str,
        id: &str,
        ttl: chrono::Duration,
    ) -> Result<(), sqlx::Error> {
        let expires_at: DateTime<Utc> = Utc::now() + ttl;
        let query = format!(
            "INSERT INTO {} (event_type, business_id, processed_at, expires_at) \
             VALUES ($1, $2, NOW(), $3) \
             ON CONFLICT (event_type, business_id) DO NOTHING",
            self.table
        );
        sqlx::query(&query)
            .bind(event_type)
            .bind(id)
            .bind(expires_at.naive_utc())
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Delete expired markers; intended for a periodic maintenance job
    /// rather than the hot path.
    pub async fn sweep_expired(&self) -> Result<u64, sqlx::Error> {
        let query = format!("DELETE FROM {} WHERE expires_at <= NOW()", self.table);
        let result = sqlx::query(&query).execute(self.pool).await?;
        Ok(result.rows_affected())
    }
}

/// SQL for the `<module>_processed_events` table, shared by every
/// module's migration scripts so the shape stays identical everywhere.
pub const PROCESSED_EVENTS_TABLE_TEMPLATE: &str = r#"
CREATE TABLE IF NOT EXISTS {table} (
    id BIGSERIAL PRIMARY KEY,
    event_type TEXT NOT NULL,
    business_id TEXT NOT NULL,
    processed_at TIMESTAMP NOT NULL DEFAULT NOW(),
    expires_at TIMESTAMP NOT NULL,
    UNIQUE (event_type, business_id)
);
CREATE INDEX IF NOT EXISTS {table}_expires_at_idx ON {table} (expires_at);
"#;
