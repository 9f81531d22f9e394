use crate::config::Config;
use crate::handlers::handle_order_confirmed;
use crate::models::OrderConfirmedPayload;
use event_bus::consumer_retry::{retry_with_backoff, RetryConfig};
use event_bus::{BusMessage, EventBus};
use event_router::normalize_envelope;
use futures::StreamExt;
use idempotency::{DurableIdempotency, MemoryIdempotency};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

const PROCESSED_EVENTS_TABLE: &str = "payments_processed_events";
const FAILED_EVENTS_TABLE: &str = "payments_failed_events";

/// Subscribe to `order.confirmed` and run each one through the payment
/// handler, guarded by the dual-layer idempotency check and retried
/// with backoff before anything is sent to the dead-letter table.
pub async fn start_order_confirmed_consumer(bus: Arc<dyn EventBus>, pool: PgPool, config: Arc<Config>) {
    tokio::spawn(async move {
        tracing::info!("starting order.confirmed consumer");

        let subject = "order.confirmed";
        let mut stream = match bus.subscribe(subject).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(subject, error = %e, "failed to subscribe");
                return;
            }
        };

        let fast_idempotency = MemoryIdempotency::new();
        let retry_config = RetryConfig::default();

        while let Some(msg) = stream.next().await {
            let pool = pool.clone();
            let config = config.clone();
            let msg_clone = msg.clone();
            let fast_idempotency = fast_idempotency.clone();

            let result = retry_with_backoff(
                || {
                    let pool = pool.clone();
                    let config = config.clone();
                    let msg = msg_clone.clone();
                    let fast_idempotency = fast_idempotency.clone();
                    async move {
                        process_one(&pool, &config, &fast_idempotency, &msg)
                            .await
                            .map_err(|e| format!("{e:#}"))
                    }
                },
                &retry_config,
                "payments_order_confirmed_consumer",
            )
            .await;

            if let Err(error_msg) = result {
                event_router::handle_processing_error(&pool, FAILED_EVENTS_TABLE, &msg, &error_msg, retry_config.max_attempts as i32)
                    .await;
            }
        }

        tracing::warn!("order.confirmed consumer stopped");
    });
}

async fn process_one(
    pool: &PgPool,
    config: &Config,
    fast_idempotency: &MemoryIdempotency,
    msg: &BusMessage,
) -> anyhow::Result<()> {
    let raw: serde_json::Value = serde_json::from_slice(&msg.payload)?;
    let envelope = normalize_envelope(&raw).map_err(|e| anyhow::anyhow!("envelope normalisation failed: {e}"))?;

    let key = envelope.event_id.to_string();
    if fast_idempotency.is_processed("order.confirmed", &key) {
        tracing::debug!(event_id = %envelope.event_id, "duplicate order.confirmed, fast path");
        return Ok(());
    }

    let durable = DurableIdempotency::new(pool, PROCESSED_EVENTS_TABLE);
    if durable.is_processed("order.confirmed", &key).await.unwrap_or(false) {
        tracing::debug!(event_id = %envelope.event_id, "duplicate order.confirmed, durable path");
        return Ok(());
    }

    let order: OrderConfirmedPayload = serde_json::from_value(envelope.payload.clone())?;
    handle_order_confirmed(pool, config, order, envelope.correlation_id.clone()).await?;

    fast_idempotency.mark_processed("order.confirmed", &key, Duration::from_secs(300));
    if let Err(e) = durable.mark_processed("order.confirmed", &key, chrono::Duration::days(7)).await {
        tracing::warn!(event_id = %envelope.event_id, error = %e, "failed to write durable idempotency marker");
    }

    Ok(())
}
