use crate::config::Config;
use crate::handlers::{handle_inventory_reserved_failed, handle_inventory_reserved_success, handle_payment_failed, handle_payment_succeeded, handle_seckill_order_won};
use crate::models::{InventoryReservedFailedPayload, InventoryReservedSuccessPayload, PaymentFailedPayload, PaymentSucceededPayload, SeckillOrderWonPayload};
use event_bus::consumer_retry::{retry_with_backoff, RetryConfig};
use event_bus::{BusMessage, EventBus};
use event_router::{normalize_envelope, NormalizedEnvelope};
use futures::StreamExt;
use idempotency::{DurableIdempotency, MemoryIdempotency};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

const PROCESSED_EVENTS_TABLE: &str = "orders_processed_events";
const FAILED_EVENTS_TABLE: &str = "orders_failed_events";

/// Spawn one consumer task per saga-inbound subject. Every task runs
/// the same idempotency/retry/DLQ shape around a subject-specific
/// handler body.
pub async fn start_saga_consumers(bus: Arc<dyn EventBus>, pool: PgPool, config: Arc<Config>) {
    let fast_idempotency = MemoryIdempotency::new();

    spawn_loop(bus.clone(), pool.clone(), config.clone(), fast_idempotency.clone(), "inventory.reserved.success", process_inventory_reserved_success);
    spawn_loop(bus.clone(), pool.clone(), config.clone(), fast_idempotency.clone(), "inventory.reserved.failed", process_inventory_reserved_failed);
    spawn_loop(bus.clone(), pool.clone(), config.clone(), fast_idempotency.clone(), "payment.succeeded", process_payment_succeeded);
    spawn_loop(bus.clone(), pool.clone(), config.clone(), fast_idempotency.clone(), "payment.failed", process_payment_failed);
    spawn_loop(bus, pool, config, fast_idempotency, "seckill.order.won", process_seckill_order_won);
}

async fn process_inventory_reserved_success(pool: PgPool, config: Arc<Config>, envelope: NormalizedEnvelope) -> anyhow::Result<()> {
    let payload: InventoryReservedSuccessPayload = serde_json::from_value(envelope.payload.clone())?;
    handle_inventory_reserved_success(&pool, &config, &payload.order_id, envelope.correlation_id.clone()).await
}

async fn process_inventory_reserved_failed(pool: PgPool, config: Arc<Config>, envelope: NormalizedEnvelope) -> anyhow::Result<()> {
    let payload: InventoryReservedFailedPayload = serde_json::from_value(envelope.payload.clone())?;
    handle_inventory_reserved_failed(&pool, &config, &payload.order_id, &payload.reason, envelope.correlation_id.clone()).await
}

async fn process_payment_succeeded(pool: PgPool, config: Arc<Config>, envelope: NormalizedEnvelope) -> anyhow::Result<()> {
    let payload: PaymentSucceededPayload = serde_json::from_value(envelope.payload.clone())?;
    handle_payment_succeeded(&pool, &config, &payload.order_id, envelope.correlation_id.clone()).await
}

async fn process_payment_failed(pool: PgPool, config: Arc<Config>, envelope: NormalizedEnvelope) -> anyhow::Result<()> {
    let payload: PaymentFailedPayload = serde_json::from_value(envelope.payload.clone())?;
    handle_payment_failed(&pool, &config, &payload.order_id, &payload.reason, envelope.correlation_id.clone()).await
}

async fn process_seckill_order_won(pool: PgPool, config: Arc<Config>, envelope: NormalizedEnvelope) -> anyhow::Result<()> {
    let payload: SeckillOrderWonPayload = serde_json::from_value(envelope.payload.clone())?;
    handle_seckill_order_won(&pool, &config, &envelope.event_id.to_string(), &payload, envelope.correlation_id.clone()).await
}

/// Generic over the per-subject handler body: subscribe, then for each
/// message run it through the dual-layer idempotency check, the
/// supplied handler (with retry/backoff on failure), and finally the
/// dead-letter table if every retry is exhausted.
fn spawn_loop<F, Fut>(bus: Arc<dyn EventBus>, pool: PgPool, config: Arc<Config>, fast_idempotency: MemoryIdempotency, subject: &'static str, handler: F)
where
    F: Fn(PgPool, Arc<Config>, NormalizedEnvelope) -> Fut + Send + Sync + Clone + 'static,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        tracing::info!(subject, "starting saga consumer");

        let mut stream = match bus.subscribe(subject).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(subject, error = %e, "failed to subscribe");
                return;
            }
        };

        let retry_config = RetryConfig::default();

        while let Some(msg) = stream.next().await {
            let pool = pool.clone();
            let config = config.clone();
            let msg_clone = msg.clone();
            let fast_idempotency = fast_idempotency.clone();
            let handler = handler.clone();

            let result = retry_with_backoff(
                || {
                    let pool = pool.clone();
                    let config = config.clone();
                    let msg = msg_clone.clone();
                    let fast_idempotency = fast_idempotency.clone();
                    let handler = handler.clone();
                    async move {
                        process_one(pool, config, &fast_idempotency, &msg, subject, handler)
                            .await
                            .map_err(|e| format!("{e:#}"))
                    }
                },
                &retry_config,
                subject,
            )
            .await;

            if let Err(error_msg) = result {
                event_router::handle_processing_error(&pool, FAILED_EVENTS_TABLE, &msg, &error_msg, retry_config.max_attempts as i32).await;
            }
        }

        tracing::warn!(subject, "saga consumer stopped");
    });
}

async fn process_one<F, Fut>(
    pool: PgPool,
    config: Arc<Config>,
    fast_idempotency: &MemoryIdempotency,
    msg: &BusMessage,
    subject: &str,
    handler: F,
) -> anyhow::Result<()>
where
    F: Fn(PgPool, Arc<Config>, NormalizedEnvelope) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<()>>,
{
    let raw: serde_json::Value = serde_json::from_slice(&msg.payload)?;
    let envelope = normalize_envelope(&raw).map_err(|e| anyhow::anyhow!("envelope normalisation failed: {e}"))?;

    let key = envelope.event_id.to_string();
    if fast_idempotency.is_processed(subject, &key) {
        tracing::debug!(event_id = %envelope.event_id, subject, "duplicate event, fast path");
        return Ok(());
    }

    let durable = DurableIdempotency::new(&pool, PROCESSED_EVENTS_TABLE);
    if durable.is_processed(subject, &key).await.unwrap_or(false) {
        tracing::debug!(event_id = %envelope.event_id, subject, "duplicate event, durable path");
        return Ok(());
    }

    handler(pool.clone(), config, envelope).await?;

    fast_idempotency.mark_processed(subject, &key, Duration::from_secs(300));
    if let Err(e) = durable.mark_processed(subject, &key, chrono::Duration::days(7)).await {
        tracing::warn!(subject, error = %e, "failed to write durable idempotency marker");
    }

    Ok(())
}
