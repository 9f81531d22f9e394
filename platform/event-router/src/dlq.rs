use event_bus::BusMessage;
use sqlx::PgPool;
use uuid::Uuid;

/// Insert a failed event into a module's dead-letter table. Every
/// module owns its own `failed_events` table, so this writes through
/// a caller-supplied table name rather than assuming a single shared one.
pub async fn insert_failed_event(
    pool: &PgPool,
    table: &'static str,
    event_id: Uuid,
    subject: &str,
    envelope_json: &serde_json::Value,
    error: &str,
    retry_count: i32,
) -> Result<(), sqlx::Error> {
    let query = format!(
        r#"
        INSERT INTO {table} (event_id, subject, envelope_json, error, retry_count)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (event_id) DO UPDATE
        SET retry_count = EXCLUDED.retry_count,
            error = EXCLUDED.error,
            failed_at = NOW()
        "#
    );

    sqlx::query(&query)
        .bind(event_id)
        .bind(subject)
        .bind(envelope_json)
        .bind(error)
        .bind(retry_count)
        .execute(pool)
        .await?;

    tracing::error!(event_id = %event_id, subject, error, "event moved to DLQ after failure");

    Ok(())
}

/// Log and write a failed message to the DLQ after its retry budget is
/// exhausted. Extracts `event_id`/`correlation_id`/`source_module` for
/// logging even when the envelope fails to parse, so the failure is
/// never silent.
pub async fn handle_processing_error(
    pool: &PgPool,
    table: &'static str,
    msg: &BusMessage,
    error: &str,
    retry_count: i32,
) {
    match serde_json::from_slice::<serde_json::Value>(&msg.payload) {
        Ok(env) => {
            let event_id_opt = env
                .get("event_id")
                .and_then(|v| v.as_str())
                .and_then(|s| Uuid::parse_str(s).ok());

            let correlation_id = env
                .get("correlation_id")
                .or_else(|| env.get("trace_id"))
                .and_then(|v| v.as_str())
                .unwrap_or("none");

            let source_module = env
                .get("source_module")
                .or_else(|| env.get("producer"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");

            match event_id_opt {
                Some(event_id) => {
                    if let Err(dlq_err) =
                        insert_failed_event(pool, table, event_id, &msg.subject, &env, error, retry_count).await
                    {
                        tracing::error!(
                            event_id = %event_id,
                            subject = %msg.subject,
                            correlation_id,
                            source_module,
                            retry_count,
                            error,
                            dlq_error = %dlq_err,
                            "failed to write to DLQ, event may be lost"
                        );
                    } else {
                        tracing::error!(
                            event_id = %event_id,
                            subject = %msg.subject,
                            correlation_id,
                            source_module,
                            retry_count,
                            error,
                            "event moved to DLQ after retries exhausted"
                        );
                    }
                }
                None => {
                    tracing::error!(
                        subject = %msg.subject,
                        error,
                        "failed to extract event_id from envelope for DLQ"
                    );
                }
            }
        }
        Err(parse_err) => {
            tracing::error!(
                subject = %msg.subject,
                error,
                parse_error = %parse_err,
                "failed to process event and could not parse envelope for DLQ"
            );
        }
    }
}

/// DDL template for a module's `failed_events` table.
pub const FAILED_EVENTS_TABLE_TEMPLATE: &str = r#"
CREATE TABLE IF NOT EXISTS {table} (
    id BIGSERIAL PRIMARY KEY,
    event_id UUID NOT NULL UNIQUE,
    subject TEXT NOT NULL,
    envelope_json JSONB NOT NULL,
    error TEXT NOT NULL,
    retry_count INT NOT NULL DEFAULT 0,
    failed_at TIMESTAMP NOT NULL DEFAULT NOW()
);
"#;
