use crate::models::{InventoryRow, OrderLineItem, ReserveError, ReserveOutcome};
use distributed_lock::{with_lock, with_locks_ordered, DistributedLock, LockError};
use outbox::{NewOutboxEvent, OutboxManager, OutboxMetadata};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

const OUTBOX_TABLE: &str = "inventory_events_outbox";

/// Reserve `items` against `order_id`: acquire a lock on every
/// productId in lexicographic order (see `distributed_lock::with_locks_ordered`),
/// pre-check availability, apply one batched conditional update, write
/// one audit row per line, and enqueue the outcome event — all inside
/// one transaction, released on every exit path by the lock helper.
///
/// Insufficient stock is reported as `Ok(ReserveOutcome::Failed { .. })`,
/// not an `Err`: it's a successful processing of the message that
/// happens to produce a negative business outcome.
pub async fn reserve_batch(
    pool: &PgPool,
    lock: &dyn DistributedLock,
    lock_ttl: Duration,
    order_id: &str,
    correlation_id: Option<String>,
    items: Vec<OrderLineItem>,
) -> Result<ReserveOutcome, ReserveError> {
    let resource_ids: Vec<String> = items.iter().map(|i| i.product_id.clone()).collect();

    let outcome = with_locks_ordered(lock, "product", resource_ids, lock_ttl, || async {
        reserve_locked(pool, order_id, correlation_id.clone(), &items)
            .await
            .map_err(|e| LockError::BackendError(e.to_string()))
    })
    .await?;

    Ok(outcome)
}

async fn reserve_locked(pool: &PgPool, order_id: &str, correlation_id: Option<String>, items: &[OrderLineItem]) -> anyhow::Result<ReserveOutcome> {
    let mut tx = pool.begin().await?;

    let product_ids: Vec<String> = items.iter().map(|i| i.product_id.clone()).collect();
    let rows: Vec<InventoryRow> =
        sqlx::query_as("SELECT product_id, available, reserved, last_restocked_at FROM inventory WHERE product_id = ANY($1) FOR UPDATE")
            .bind(&product_ids)
            .fetch_all(&mut *tx)
            .await?;

    let available_by_product: HashMap<String, i32> = rows.iter().map(|r| (r.product_id.clone(), r.available)).collect();

    for item in items {
        let available = *available_by_product.get(&item.product_id).unwrap_or(&0);
        if available < item.quantity {
            tx.rollback().await?;
            let reason = format!("Insufficient stock for product {}: requested {}, available {}", item.product_id, item.quantity, available);
            return write_failure(pool, order_id, correlation_id, Some(item.product_id.clone()), reason).await;
        }
    }

    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("UPDATE inventory AS i SET available = i.available - v.qty, reserved = i.reserved + v.qty FROM (");
    builder.push_values(items.iter(), |mut b, item| {
        b.push_bind(item.product_id.clone()).push_bind(item.quantity);
    });
    builder.push(") AS v(product_id, qty) WHERE i.product_id = v.product_id AND i.available >= v.qty RETURNING i.product_id");

    let updated: Vec<(String,)> = builder.build_query_as().fetch_all(&mut *tx).await?;

    if updated.len() != items.len() {
        tx.rollback().await?;
        tracing::warn!(order_id, "concurrent modification detected while reserving stock, aborting");
        return write_failure(pool, order_id, correlation_id, None, "concurrent modification while reserving stock".to_string()).await;
    }

    for item in items {
        let available_before = *available_by_product.get(&item.product_id).unwrap_or(&0);
        sqlx::query(
            r#"
            INSERT INTO inventory_audit (product_id, action, previous_value, new_value, delta, reason, order_id, correlation_id)
            VALUES ($1, 'RESERVE', $2, $3, $4, 'ORDER_RESERVE', $5, $6)
            "#,
        )
        .bind(&item.product_id)
        .bind(available_before)
        .bind(available_before - item.quantity)
        .bind(-item.quantity)
        .bind(order_id)
        .bind(&correlation_id)
        .execute(&mut *tx)
        .await?;
    }

    let payload = crate::models::InventoryReservedSuccessPayload {
        order_id: order_id.to_string(),
        products: items.to_vec(),
    };

    let outbox = OutboxManager::new(OUTBOX_TABLE);
    let inserted = outbox
        .create_event(
            &mut tx,
            NewOutboxEvent {
                event_id: Uuid::new_v4(),
                aggregate_id: order_id.to_string(),
                aggregate_type: "inventory".to_string(),
                event_type: "inventory.reserved.success".to_string(),
                payload: serde_json::to_value(&payload)?,
                routing_key: "inventory.reserved.success".to_string(),
                metadata: OutboxMetadata {
                    correlation_id: correlation_id.clone(),
                    causation_id: None,
                    service: "inventory".to_string(),
                },
                max_retries: 5,
            },
        )
        .await?;

    if !inserted {
        tx.rollback().await?;
        tracing::info!(order_id, "inventory.reserved.success already enqueued by another instance");
        return Ok(ReserveOutcome::Success);
    }

    tx.commit().await?;
    tracing::info!(order_id, "inventory reserved");
    Ok(ReserveOutcome::Success)
}

async fn write_failure(pool: &PgPool, order_id: &str, correlation_id: Option<String>, product_id: Option<String>, reason: String) -> anyhow::Result<ReserveOutcome> {
    let mut tx = pool.begin().await?;

    let payload = crate::models::InventoryReservedFailedPayload {
        order_id: order_id.to_string(),
        reason: reason.clone(),
        product_id: product_id.clone(),
    };

    let outbox = OutboxManager::new(OUTBOX_TABLE);
    outbox
        .create_event(
            &mut tx,
            NewOutboxEvent {
                event_id: Uuid::new_v4(),
                aggregate_id: order_id.to_string(),
                aggregate_type: "inventory".to_string(),
                event_type: "inventory.reserved.failed".to_string(),
                payload: serde_json::to_value(&payload)?,
                routing_key: "inventory.reserved.failed".to_string(),
                metadata: OutboxMetadata {
                    correlation_id,
                    causation_id: None,
                    service: "inventory".to_string(),
                },
                max_retries: 5,
            },
        )
        .await?;

    tx.commit().await?;
    tracing::warn!(order_id, reason = %reason, "inventory reservation failed");
    Ok(ReserveOutcome::Failed { product_id, reason })
}

/// Release `quantity` units of `product_id` back to availability.
/// Releasing more than is currently reserved is treated as an
/// already-released idempotent success (with a warning), matching the
/// compensation path where a prior partial release may have already run.
pub async fn release(pool: &PgPool, lock: &dyn DistributedLock, lock_ttl: Duration, product_id: &str, quantity: i32, order_id: &str, correlation_id: Option<String>) -> Result<(), ReserveError> {
    with_lock(lock, "product", product_id, lock_ttl, || async {
        release_locked(pool, product_id, quantity, order_id, correlation_id.clone()).await.map_err(|e| LockError::BackendError(e.to_string()))
    })
    .await?;
    Ok(())
}

async fn release_locked(pool: &PgPool, product_id: &str, quantity: i32, order_id: &str, correlation_id: Option<String>) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;

    let row: Option<(i32, i32)> = sqlx::query_as("SELECT available, reserved FROM inventory WHERE product_id = $1 FOR UPDATE")
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?;

    let Some((available_before, reserved_before)) = row else {
        tx.rollback().await?;
        tracing::warn!(product_id, order_id, "release requested for unknown product, treating as already-released");
        return Ok(());
    };

    let actual_release = quantity.min(reserved_before);
    if actual_release < quantity {
        tracing::warn!(
            product_id,
            order_id,
            requested = quantity,
            reserved = reserved_before,
            "release requested more than reserved, clamping and treating as already-released for the remainder"
        );
    }

    if actual_release == 0 {
        tx.rollback().await?;
        return Ok(());
    }

    sqlx::query("UPDATE inventory SET available = available + $2, reserved = reserved - $2 WHERE product_id = $1 AND reserved >= $2")
        .bind(product_id)
        .bind(actual_release)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO inventory_audit (product_id, action, previous_value, new_value, delta, reason, order_id, correlation_id)
        VALUES ($1, 'RELEASE', $2, $3, $4, 'ORDER_COMPENSATION', $5, $6)
        "#,
    )
    .bind(product_id)
    .bind(available_before)
    .bind(available_before + actual_release)
    .bind(actual_release)
    .bind(order_id)
    .bind(&correlation_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!(product_id, order_id, released = actual_release, "inventory released");
    Ok(())
}
