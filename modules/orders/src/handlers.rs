use crate::config::Config;
use crate::fsm::{next_status, SagaEvent};
use crate::models::{
    CreateOrderRequest, CreateOrderResponse, OrderCancelledPayload, OrderConfirmedPayload, OrderCreatedPayload,
    OrderLineItem, OrderRow, OrderSeckillReleasePayload, OrderStatus, SeckillOrderWonPayload,
};
use outbox::{NewOutboxEvent, OutboxManager, OutboxMetadata};
use sqlx::PgPool;
use uuid::Uuid;

const OUTBOX_TABLE: &str = "orders_events_outbox";

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("item quantity must be positive")]
    InvalidQuantity,
    #[error("order has no items")]
    Empty,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn deterministic_event_id(kind: &str, order_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("{kind}:{order_id}").as_bytes())
}

/// `POST /orders`: validate, persist the PENDING order and its
/// `order.created` outbox event in one transaction, and return
/// immediately — the saga proceeds entirely through the event
/// consumers from here.
pub async fn create_order(pool: &PgPool, req: CreateOrderRequest) -> Result<CreateOrderResponse, OrderError> {
    if req.items.is_empty() {
        return Err(OrderError::Empty);
    }
    if req.items.iter().any(|i| i.quantity <= 0) {
        return Err(OrderError::InvalidQuantity);
    }

    let order_id = Uuid::new_v4().to_string();
    let products: Vec<OrderLineItem> = req
        .items
        .iter()
        .map(|i| OrderLineItem {
            product_id: i.product_id.clone(),
            quantity: i.quantity,
            unit_price: i.unit_price,
        })
        .collect();
    let total_price: f64 = products.iter().map(|p| p.unit_price * p.quantity as f64).sum();

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO orders (order_id, user_id, products, total_price, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, 'PENDING', NOW(), NOW())
        "#,
    )
    .bind(&order_id)
    .bind(&req.user_id)
    .bind(serde_json::to_value(&products).map_err(|e| OrderError::Other(e.into()))?)
    .bind(total_price)
    .execute(&mut *tx)
    .await?;

    let payload = OrderCreatedPayload {
        order_id: order_id.clone(),
        user_id: req.user_id.clone(),
        products,
    };

    let outbox = OutboxManager::new(OUTBOX_TABLE);
    outbox
        .create_event(
            &mut tx,
            NewOutboxEvent {
                event_id: Uuid::new_v4(),
                aggregate_id: order_id.clone(),
                aggregate_type: "order".to_string(),
                event_type: "order.created".to_string(),
                payload: serde_json::to_value(&payload).map_err(|e| OrderError::Other(e.into()))?,
                routing_key: "order.created".to_string(),
                metadata: OutboxMetadata {
                    correlation_id: None,
                    causation_id: None,
                    service: "orders".to_string(),
                },
                max_retries: 5,
            },
        )
        .await?;

    tx.commit().await?;
    tracing::info!(order_id = %order_id, %total_price, "order created");

    Ok(CreateOrderResponse {
        order_id,
        status: "PENDING",
        total_price,
    })
}

pub async fn get_order(pool: &PgPool, order_id: &str) -> Result<Option<OrderRow>, sqlx::Error> {
    sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE order_id = $1")
        .bind(order_id)
        .fetch_optional(pool)
        .await
}

/// `seckill.order.won`: the flash-sale engine already granted the
/// reservation, so this creates the order straight into CONFIRMED
/// instead of running it through the usual PENDING -> CONFIRMED
/// transition. `order_id` is derived deterministically from the
/// winning event so a redelivery of the same win can't create a
/// second order even if the idempotency marker were ever lost.
pub async fn handle_seckill_order_won(
    pool: &PgPool,
    config: &Config,
    event_id: &str,
    payload: &SeckillOrderWonPayload,
    correlation_id: Option<String>,
) -> anyhow::Result<()> {
    let order_id = deterministic_event_id("seckill-order", event_id).to_string();
    let products = vec![OrderLineItem {
        product_id: payload.product_id.clone(),
        quantity: 1,
        unit_price: payload.price,
    }];

    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO orders (order_id, user_id, products, total_price, status, correlation_id, source, created_at, updated_at)
        VALUES ($1, $2, $3, $4, 'CONFIRMED', $5, 'seckill', NOW(), NOW())
        ON CONFLICT (order_id) DO NOTHING
        "#,
    )
    .bind(&order_id)
    .bind(&payload.user_id)
    .bind(serde_json::to_value(&products)?)
    .bind(payload.price)
    .bind(&correlation_id)
    .execute(&mut *tx)
    .await?;

    if inserted.rows_affected() == 0 {
        tx.rollback().await?;
        tracing::debug!(order_id, "seckill order already created, skipping duplicate win");
        return Ok(());
    }

    let confirmed_payload = OrderConfirmedPayload {
        order_id: order_id.clone(),
        total_price: payload.price,
        currency: config.currency.clone(),
        products,
    };

    let outbox = OutboxManager::new(OUTBOX_TABLE);
    outbox
        .create_event(
            &mut tx,
            NewOutboxEvent {
                event_id: deterministic_event_id("order-confirmed", &order_id),
                aggregate_id: order_id.clone(),
                aggregate_type: "order".to_string(),
                event_type: "order.confirmed".to_string(),
                payload: serde_json::to_value(&confirmed_payload)?,
                routing_key: "order.confirmed".to_string(),
                metadata: OutboxMetadata {
                    correlation_id,
                    causation_id: None,
                    service: "orders".to_string(),
                },
                max_retries: 5,
            },
        )
        .await?;

    tx.commit().await?;
    tracing::info!(order_id, product_id = %payload.product_id, "seckill order confirmed");
    Ok(())
}

/// `inventory.reserved.success`: PENDING -> CONFIRMED. Emits
/// `order.confirmed`, the handoff contract to the payment consumer.
pub async fn handle_inventory_reserved_success(
    pool: &PgPool,
    config: &Config,
    order_id: &str,
    correlation_id: Option<String>,
) -> anyhow::Result<()> {
    apply_guarded_transition(pool, order_id, OrderStatus::Pending, SagaEvent::InventoryReservedSuccess, None, config, correlation_id)
        .await
}

/// `inventory.reserved.failed`: PENDING -> CANCELLED. No compensation
/// needed here — nothing was reserved.
pub async fn handle_inventory_reserved_failed(
    pool: &PgPool,
    config: &Config,
    order_id: &str,
    reason: &str,
    correlation_id: Option<String>,
) -> anyhow::Result<()> {
    apply_guarded_transition(
        pool,
        order_id,
        OrderStatus::Pending,
        SagaEvent::InventoryReservedFailed,
        Some(format!("Insufficient stock: {reason}")),
        config,
        correlation_id,
    )
    .await
}

/// `payment.succeeded`: CONFIRMED -> PAID. Terminal; no further outbox
/// event is defined for this transition.
pub async fn handle_payment_succeeded(
    pool: &PgPool,
    config: &Config,
    order_id: &str,
    correlation_id: Option<String>,
) -> anyhow::Result<()> {
    apply_guarded_transition(pool, order_id, OrderStatus::Confirmed, SagaEvent::PaymentSucceeded, None, config, correlation_id).await
}

/// `payment.failed`: CONFIRMED -> CANCELLED. Inventory independently
/// observes the same `payment.failed` event and releases stock; this
/// handler only owns the Order row.
pub async fn handle_payment_failed(
    pool: &PgPool,
    config: &Config,
    order_id: &str,
    reason: &str,
    correlation_id: Option<String>,
) -> anyhow::Result<()> {
    apply_guarded_transition(
        pool,
        order_id,
        OrderStatus::Confirmed,
        SagaEvent::PaymentFailed,
        Some(reason.to_string()),
        config,
        correlation_id,
    )
    .await
}

/// Shared core of every saga consumer: guard the UPDATE on the exact
/// expected `from` status so a redelivered or out-of-order event
/// becomes a no-op instead of a double transition, then enqueue
/// whatever outbox event the resulting status calls for in the same
/// transaction.
async fn apply_guarded_transition(
    pool: &PgPool,
    order_id: &str,
    from: OrderStatus,
    event: SagaEvent,
    cancellation_reason: Option<String>,
    config: &Config,
    correlation_id: Option<String>,
) -> anyhow::Result<()> {
    let to = match next_status(from, event) {
        Some(to) => to,
        None => unreachable!("apply_guarded_transition called with a (from, event) pair outside the FSM table"),
    };

    let mut tx = pool.begin().await?;

    let updated = sqlx::query("UPDATE orders SET status = $2, cancellation_reason = $3, updated_at = NOW() WHERE order_id = $1 AND status = $4")
        .bind(order_id)
        .bind(to.as_str())
        .bind(&cancellation_reason)
        .bind(from.as_str())
        .execute(&mut *tx)
        .await?;

    if updated.rows_affected() == 0 {
        tx.rollback().await?;
        tracing::debug!(order_id, from = from.as_str(), to = to.as_str(), "order not in expected state, skipping transition");
        return Ok(());
    }

    let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE order_id = $1")
        .bind(order_id)
        .fetch_one(&mut *tx)
        .await?;
    let products: Vec<OrderLineItem> = serde_json::from_value(row.products.clone())?;

    let outbox = OutboxManager::new(OUTBOX_TABLE);
    match to {
        OrderStatus::Confirmed => {
            let payload = OrderConfirmedPayload {
                order_id: order_id.to_string(),
                total_price: row.total_price,
                currency: config.currency.clone(),
                products,
            };
            outbox
                .create_event(
                    &mut tx,
                    NewOutboxEvent {
                        event_id: deterministic_event_id("order-confirmed", order_id),
                        aggregate_id: order_id.to_string(),
                        aggregate_type: "order".to_string(),
                        event_type: "order.confirmed".to_string(),
                        payload: serde_json::to_value(&payload)?,
                        routing_key: "order.confirmed".to_string(),
                        metadata: OutboxMetadata {
                            correlation_id,
                            causation_id: None,
                            service: "orders".to_string(),
                        },
                        max_retries: 5,
                    },
                )
                .await?;
        }
        OrderStatus::Cancelled => {
            let payload = OrderCancelledPayload {
                order_id: order_id.to_string(),
                products: products.clone(),
                reason: cancellation_reason.clone().unwrap_or_default(),
            };
            outbox
                .create_event(
                    &mut tx,
                    NewOutboxEvent {
                        event_id: deterministic_event_id("order-cancelled", order_id),
                        aggregate_id: order_id.to_string(),
                        aggregate_type: "order".to_string(),
                        event_type: "order.cancelled".to_string(),
                        payload: serde_json::to_value(&payload)?,
                        routing_key: "order.cancelled".to_string(),
                        metadata: OutboxMetadata {
                            correlation_id: correlation_id.clone(),
                            causation_id: None,
                            service: "orders".to_string(),
                        },
                        max_retries: 5,
                    },
                )
                .await?;

            // A seckill-sourced order was never reserved in the C3
            // inventory table, so the usual inventory release is a
            // no-op for it; the flash-sale engine owns the actual
            // compensation and needs this dedicated event to run it.
            if row.source == "seckill" {
                if let Some(item) = products.first() {
                    let release_payload = OrderSeckillReleasePayload {
                        product_id: item.product_id.clone(),
                        user_id: row.user_id.clone(),
                    };
                    outbox
                        .create_event(
                            &mut tx,
                            NewOutboxEvent {
                                event_id: deterministic_event_id("order-seckill-release", order_id),
                                aggregate_id: order_id.to_string(),
                                aggregate_type: "order".to_string(),
                                event_type: "order.seckill.release".to_string(),
                                payload: serde_json::to_value(&release_payload)?,
                                routing_key: "order.seckill.release".to_string(),
                                metadata: OutboxMetadata {
                                    correlation_id,
                                    causation_id: None,
                                    service: "orders".to_string(),
                                },
                                max_retries: 5,
                            },
                        )
                        .await?;
                }
            }
        }
        OrderStatus::Paid => {
            // No event is defined for this terminal transition; the
            // status change itself is the observable effect.
        }
        OrderStatus::Pending => unreachable!("the FSM never transitions back into PENDING"),
    }

    tx.commit().await?;
    tracing::info!(order_id, from = from.as_str(), to = to.as_str(), "order transitioned");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_ids_are_stable_per_kind_and_order() {
        let a = deterministic_event_id("order-confirmed", "order-1");
        let b = deterministic_event_id("order-confirmed", "order-1");
        let c = deterministic_event_id("order-cancelled", "order-1");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
