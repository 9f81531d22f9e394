use crate::ghost_journal;
use crate::models::{BuyOutcome, BuyResponse, ReserveOutcome, SeckillError, SeckillOrderWonPayload};
use crate::store::SeckillStore;
use event_bus::EventBus;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Attempt a flash-sale purchase: reserve via the atomic script, then
/// best-effort publish the win. A publish failure never rolls back the
/// reservation — it falls back to the ghost-order journal instead.
pub async fn buy(
    store: &SeckillStore,
    bus: &Arc<dyn EventBus>,
    pool: &PgPool,
    product_id: &str,
    user_id: &str,
    rate_limit: u32,
    rate_window_secs: u32,
    price: f64,
    correlation_id: Option<String>,
) -> Result<BuyOutcome, SeckillError> {
    let outcome = store.reserve(product_id, user_id, rate_limit, rate_window_secs).await?;

    if outcome != ReserveOutcome::Won {
        return Ok(BuyOutcome::Rejected(outcome));
    }

    let correlation_id = correlation_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let payload = SeckillOrderWonPayload {
        product_id: product_id.to_string(),
        user_id: user_id.to_string(),
        price,
    };

    let envelope = serde_json::json!({
        "event_id": Uuid::new_v4(),
        "occurred_at": chrono::Utc::now(),
        "source_module": "seckill",
        "source_version": "1.0.0",
        "correlation_id": correlation_id.clone(),
        "causation_id": serde_json::Value::Null,
        "payload": payload,
    });

    let bytes = match serde_json::to_vec(&envelope) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(product_id, user_id, error = %e, "failed to serialize seckill.order.won, appending to ghost journal");
            ghost_journal::append(pool, &correlation_id, &payload).await.ok();
            return Ok(BuyOutcome::Won(BuyResponse { correlation_id }));
        }
    };

    if let Err(e) = bus.publish("seckill.order.won", bytes).await {
        tracing::error!(product_id, user_id, error = %e, "seckill.order.won publish failed");
        if let Err(journal_err) = ghost_journal::append(pool, &correlation_id, &payload).await {
            tracing::error!(product_id, user_id, error = %journal_err, "failed to append to ghost-order journal after a failed publish, event may be lost");
        }
    }

    Ok(BuyOutcome::Won(BuyResponse { correlation_id }))
}

/// Admin/compensation release: remove `user_id` from winners and
/// return their unit to stock if they were in fact a winner. Publishes
/// `seckill.released` best-effort; unlike `buy`, a failed publish here
/// isn't journaled, since the caller (an operator, or an upstream
/// `order.seckill.release` consumer) already owns the retry decision.
pub async fn release(store: &SeckillStore, bus: &Arc<dyn EventBus>, product_id: &str, user_id: &str) -> Result<(), SeckillError> {
    let released = store.release(product_id, user_id).await?;
    if !released {
        tracing::info!(product_id, user_id, "release requested for a user not currently a winner, treating as already-released");
        return Ok(());
    }

    let envelope = serde_json::json!({
        "event_id": Uuid::new_v4(),
        "occurred_at": chrono::Utc::now(),
        "source_module": "seckill",
        "source_version": "1.0.0",
        "correlation_id": serde_json::Value::Null,
        "causation_id": serde_json::Value::Null,
        "payload": { "product_id": product_id, "user_id": user_id },
    });

    match serde_json::to_vec(&envelope) {
        Ok(bytes) => {
            if let Err(e) = bus.publish("seckill.released", bytes).await {
                tracing::error!(product_id, user_id, error = %e, "seckill.released publish failed");
            }
        }
        Err(e) => tracing::error!(product_id, user_id, error = %e, "failed to serialize seckill.released"),
    }

    Ok(())
}
