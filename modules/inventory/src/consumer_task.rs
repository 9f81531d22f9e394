use crate::catalog::{handle_product_created, handle_product_deleted};
use crate::config::Config;
use crate::engine::{reserve_batch, release};
use crate::models::{OrderCancelledPayload, OrderCreatedPayload, PaymentFailedPayload, ProductDeletedPayload};
use distributed_lock::DistributedLock;
use event_bus::consumer_retry::{retry_with_backoff, RetryConfig};
use event_bus::{BusMessage, EventBus};
use event_router::{normalize_envelope, NormalizedEnvelope};
use futures::StreamExt;
use idempotency::{DurableIdempotency, MemoryIdempotency};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

const PROCESSED_EVENTS_TABLE: &str = "inventory_processed_events";
const FAILED_EVENTS_TABLE: &str = "inventory_failed_events";

/// Spawn one consumer task per inbound subject this module reacts to:
/// the two saga lifecycle events that drive reservation/release, the
/// compensating cancellation path, and the product catalogue lifecycle.
pub async fn start_inventory_consumers(bus: Arc<dyn EventBus>, pool: PgPool, config: Arc<Config>, lock: Arc<dyn DistributedLock>) {
    let fast_idempotency = MemoryIdempotency::new();

    spawn_loop(bus.clone(), pool.clone(), config.clone(), lock.clone(), fast_idempotency.clone(), "order.created", process_order_created);
    spawn_loop(bus.clone(), pool.clone(), config.clone(), lock.clone(), fast_idempotency.clone(), "order.cancelled", process_order_cancelled);
    spawn_loop(bus.clone(), pool.clone(), config.clone(), lock.clone(), fast_idempotency.clone(), "payment.failed", process_payment_failed);
    spawn_loop(bus.clone(), pool.clone(), config.clone(), lock.clone(), fast_idempotency.clone(), "product.product.created", process_product_created);
    spawn_loop(bus, pool, config, lock, fast_idempotency, "product.product.deleted", process_product_deleted);
}

async fn process_order_created(pool: PgPool, config: Arc<Config>, lock: Arc<dyn DistributedLock>, envelope: NormalizedEnvelope) -> anyhow::Result<()> {
    let payload: OrderCreatedPayload = serde_json::from_value(envelope.payload.clone())?;
    let lock_ttl = Duration::from_secs(config.lock_ttl_seconds);
    reserve_batch(&pool, lock.as_ref(), lock_ttl, &payload.order_id, envelope.correlation_id.clone(), payload.products).await?;
    Ok(())
}

async fn process_order_cancelled(pool: PgPool, config: Arc<Config>, lock: Arc<dyn DistributedLock>, envelope: NormalizedEnvelope) -> anyhow::Result<()> {
    let payload: OrderCancelledPayload = serde_json::from_value(envelope.payload.clone())?;
    release_all(&pool, lock.as_ref(), Duration::from_secs(config.lock_ttl_seconds), &payload.order_id, envelope.correlation_id.clone(), payload.products).await
}

async fn process_payment_failed(pool: PgPool, config: Arc<Config>, lock: Arc<dyn DistributedLock>, envelope: NormalizedEnvelope) -> anyhow::Result<()> {
    let payload: PaymentFailedPayload = serde_json::from_value(envelope.payload.clone())?;
    release_all(&pool, lock.as_ref(), Duration::from_secs(config.lock_ttl_seconds), &payload.order_id, envelope.correlation_id.clone(), payload.products).await
}

/// The compensating release iterates line-by-line rather than as one
/// batched statement: each release independently tolerates a product
/// already having been released by a prior partial compensation, so
/// there's no benefit to forcing them into lockstep.
async fn release_all(
    pool: &PgPool,
    lock: &dyn DistributedLock,
    lock_ttl: Duration,
    order_id: &str,
    correlation_id: Option<String>,
    products: Vec<crate::models::OrderLineItem>,
) -> anyhow::Result<()> {
    for item in products {
        release(pool, lock, lock_ttl, &item.product_id, item.quantity, order_id, correlation_id.clone()).await?;
    }
    Ok(())
}

async fn process_product_created(pool: PgPool, _config: Arc<Config>, _lock: Arc<dyn DistributedLock>, envelope: NormalizedEnvelope) -> anyhow::Result<()> {
    let product_id = envelope
        .payload
        .get("product_id")
        .or_else(|| envelope.payload.get("productId"))
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("product.created payload missing product_id"))?;

    let raw_available = envelope
        .payload
        .get("available")
        .or_else(|| envelope.payload.get("initialStock"))
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    let available = event_router::clamp_stock_quantity(&raw_available);

    handle_product_created(&pool, product_id, available).await
}

async fn process_product_deleted(pool: PgPool, _config: Arc<Config>, _lock: Arc<dyn DistributedLock>, envelope: NormalizedEnvelope) -> anyhow::Result<()> {
    let payload: ProductDeletedPayload = serde_json::from_value(envelope.payload.clone())?;
    handle_product_deleted(&pool, &payload.product_id).await
}

/// Generic over the per-subject handler body, mirroring the saga
/// consumer shape in the orders module: subscribe, then for each
/// message run it through the dual-layer idempotency check, the
/// supplied handler (with retry/backoff on failure), and finally the
/// dead-letter table if every retry is exhausted.
fn spawn_loop<F, Fut>(
    bus: Arc<dyn EventBus>,
    pool: PgPool,
    config: Arc<Config>,
    lock: Arc<dyn DistributedLock>,
    fast_idempotency: MemoryIdempotency,
    subject: &'static str,
    handler: F,
) where
    F: Fn(PgPool, Arc<Config>, Arc<dyn DistributedLock>, NormalizedEnvelope) -> Fut + Send + Sync + Clone + 'static,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        tracing::info!(subject, "starting inventory consumer");

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
            let lock = lock.clone();
            let msg_clone = msg.clone();
            let fast_idempotency = fast_idempotency.clone();
            let handler = handler.clone();

            let result = retry_with_backoff(
                || {
                    let pool = pool.clone();
                    let config = config.clone();
                    let lock = lock.clone();
                    let msg = msg_clone.clone();
                    let fast_idempotency = fast_idempotency.clone();
                    let handler = handler.clone();
                    async move {
                        process_one(pool, config, lock, &fast_idempotency, &msg, subject, handler)
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

        tracing::warn!(subject, "inventory consumer stopped");
    });
}

async fn process_one<F, Fut>(
    pool: PgPool,
    config: Arc<Config>,
    lock: Arc<dyn DistributedLock>,
    fast_idempotency: &MemoryIdempotency,
    msg: &BusMessage,
    subject: &str,
    handler: F,
) -> anyhow::Result<()>
where
    F: Fn(PgPool, Arc<Config>, Arc<dyn DistributedLock>, NormalizedEnvelope) -> Fut,
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

    handler(pool.clone(), config, lock, envelope).await?;

    fast_idempotency.mark_processed(subject, &key, Duration::from_secs(300));
    if let Err(e) = durable.mark_processed(subject, &key, chrono::Duration::days(7)).await {
        tracing::warn!(subject, error = %e, "failed to write durable idempotency marker");
    }

    Ok(())
}
