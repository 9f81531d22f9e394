use crate::models::OrderSeckillReleasePayload;
use crate::service;
use crate::store::SeckillStore;
use event_bus::consumer_retry::{retry_with_backoff, RetryConfig};
use event_bus::{BusMessage, EventBus};
use event_router::{normalize_envelope, NormalizedEnvelope};
use futures::StreamExt;
use idempotency::{DurableIdempotency, MemoryIdempotency};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

const PROCESSED_EVENTS_TABLE: &str = "seckill_processed_events";
const FAILED_EVENTS_TABLE: &str = "seckill_failed_events";
const SUBJECT: &str = "order.seckill.release";

/// React to a compensating `order.seckill.release` (e.g. the order a
/// seckill win fed into was later cancelled) by releasing the won unit
/// back to stock.
pub async fn start_release_consumer(bus: Arc<dyn EventBus>, pool: PgPool, store: SeckillStore) {
    let fast_idempotency = MemoryIdempotency::new();
    let bus_for_publish = bus.clone();

    tokio::spawn(async move {
        tracing::info!(subject = SUBJECT, "starting seckill release consumer");

        let mut stream = match bus.subscribe(SUBJECT).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(subject = SUBJECT, error = %e, "failed to subscribe");
                return;
            }
        };

        let retry_config = RetryConfig::default();

        while let Some(msg) = stream.next().await {
            let pool = pool.clone();
            let store = store.clone();
            let bus_for_publish = bus_for_publish.clone();
            let msg_clone = msg.clone();
            let fast_idempotency = fast_idempotency.clone();

            let result = retry_with_backoff(
                || {
                    let pool = pool.clone();
                    let store = store.clone();
                    let bus_for_publish = bus_for_publish.clone();
                    let msg = msg_clone.clone();
                    let fast_idempotency = fast_idempotency.clone();
                    async move { process_one(pool, store, bus_for_publish, &fast_idempotency, &msg).await.map_err(|e| format!("{e:#}")) }
                },
                &retry_config,
                SUBJECT,
            )
            .await;

            if let Err(error_msg) = result {
                event_router::handle_processing_error(&pool, FAILED_EVENTS_TABLE, &msg, &error_msg, retry_config.max_attempts as i32).await;
            }
        }

        tracing::warn!(subject = SUBJECT, "seckill release consumer stopped");
    });
}

async fn process_one(pool: PgPool, store: SeckillStore, bus: Arc<dyn EventBus>, fast_idempotency: &MemoryIdempotency, msg: &BusMessage) -> anyhow::Result<()> {
    let raw: serde_json::Value = serde_json::from_slice(&msg.payload)?;
    let envelope: NormalizedEnvelope = normalize_envelope(&raw).map_err(|e| anyhow::anyhow!("envelope normalisation failed: {e}"))?;

    let key = envelope.event_id.to_string();
    if fast_idempotency.is_processed(SUBJECT, &key) {
        tracing::debug!(event_id = %envelope.event_id, subject = SUBJECT, "duplicate event, fast path");
        return Ok(());
    }

    let durable = DurableIdempotency::new(&pool, PROCESSED_EVENTS_TABLE);
    if durable.is_processed(SUBJECT, &key).await.unwrap_or(false) {
        tracing::debug!(event_id = %envelope.event_id, subject = SUBJECT, "duplicate event, durable path");
        return Ok(());
    }

    let payload: OrderSeckillReleasePayload = serde_json::from_value(envelope.payload.clone())?;
    service::release(&store, &bus, &payload.product_id, &payload.user_id).await?;

    fast_idempotency.mark_processed(SUBJECT, &key, Duration::from_secs(300));
    if let Err(e) = durable.mark_processed(SUBJECT, &key, chrono::Duration::days(7)).await {
        tracing::warn!(subject = SUBJECT, error = %e, "failed to write durable idempotency marker");
    }

    Ok(())
}
