use crate::models::SeckillOrderWonPayload;
use event_bus::EventBus;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// A reservation the store has already granted, whose `seckill.order.won`
/// publish failed. The reservation itself is never rolled back: the
/// contract is "reserved", and this journal exists so the event is
/// replayable rather than lost.
pub async fn append(pool: &PgPool, correlation_id: &str, payload: &SeckillOrderWonPayload) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO seckill_ghost_orders (event_id, correlation_id, payload, replayed)
        VALUES ($1, $2, $3, FALSE)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(correlation_id)
    .bind(serde_json::to_value(payload)?)
    .execute(pool)
    .await?;

    crate::metrics::SECKILL_PUBLISH_FAILURES_TOTAL.inc();
    tracing::warn!(correlation_id, product_id = %payload.product_id, user_id = %payload.user_id, "seckill.order.won publish failed, appended to ghost-order journal");
    Ok(())
}

#[derive(Debug, sqlx::FromRow)]
pub struct GhostOrderRow {
    pub id: i64,
    pub event_id: Uuid,
    pub correlation_id: String,
    pub payload: serde_json::Value,
}

/// Unreplayed rows, oldest first, for an operator-triggered (or
/// periodic background) replay pass.
pub async fn pending(pool: &PgPool, limit: i64) -> anyhow::Result<Vec<GhostOrderRow>> {
    let rows = sqlx::query_as::<_, GhostOrderRow>(
        "SELECT id, event_id, correlation_id, payload FROM seckill_ghost_orders WHERE replayed = FALSE ORDER BY created_at LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn mark_replayed(pool: &PgPool, id: i64) -> anyhow::Result<()> {
    sqlx::query("UPDATE seckill_ghost_orders SET replayed = TRUE, replayed_at = NOW() WHERE id = $1").bind(id).execute(pool).await?;
    Ok(())
}

/// Periodically attempt to republish journaled `seckill.order.won`
/// events. Runs until the process exits; a single failed drain is
/// logged and retried on the next tick rather than treated as fatal.
pub async fn run_replay_loop(pool: PgPool, bus: Arc<dyn EventBus>, poll_interval: Duration) -> ! {
    let mut ticker = tokio::time::interval(poll_interval);
    loop {
        ticker.tick().await;
        match pending(&pool, 100).await {
            Ok(rows) => {
                for row in rows {
                    let envelope = serde_json::json!({
                        "event_id": row.event_id,
                        "occurred_at": chrono::Utc::now(),
                        "source_module": "seckill",
                        "source_version": "1.0.0",
                        "correlation_id": row.correlation_id,
                        "causation_id": serde_json::Value::Null,
                        "payload": row.payload,
                    });
                    match serde_json::to_vec(&envelope) {
                        Ok(bytes) => match bus.publish("seckill.order.won", bytes).await {
                            Ok(()) => {
                                if let Err(e) = mark_replayed(&pool, row.id).await {
                                    tracing::error!(error = %e, ghost_order_id = row.id, "failed to mark ghost order replayed after a successful publish");
                                }
                            }
                            Err(e) => tracing::warn!(error = %e, ghost_order_id = row.id, "ghost-order replay publish failed, will retry next tick"),
                        },
                        Err(e) => tracing::error!(error = %e, ghost_order_id = row.id, "failed to serialize ghost order for replay"),
                    }
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to load pending ghost orders"),
        }
    }
}
