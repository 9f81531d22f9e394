use crate::config::Config;
use crate::models::{FailureCode, OrderConfirmedPayload, PaymentFailedPayload, PaymentSucceededPayload, ProcessorOutcome};
use crate::processor::MockPaymentProcessor;
use outbox::{NewOutboxEvent, OutboxManager, OutboxMetadata};
use sqlx::PgPool;
use uuid::Uuid;

const OUTBOX_TABLE: &str = "payments_events_outbox";

/// Deterministic id for a `(kind, order_id)` pair, derived with UUID v5
/// so two processor instances racing on the same order (or a single
/// instance retried after a crash) produce the exact same event_id and
/// collide on the outbox's unique constraint instead of double-publishing.
fn deterministic_event_id(kind: &str, order_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("{kind}:{order_id}").as_bytes())
}

/// React to `order.confirmed`: create (or resume) this order's Payment
/// row, run it through the mock gateway with retry/backoff on
/// transient failures, and enqueue the terminal `payment.succeeded` or
/// `payment.failed` event in the same transaction as the status
/// transition.
pub async fn handle_order_confirmed(
    pool: &PgPool,
    config: &Config,
    order: OrderConfirmedPayload,
    correlation_id: Option<String>,
) -> anyhow::Result<()> {
    if !claim_for_processing(pool, &order, correlation_id.as_deref()).await? {
        tracing::info!(order_id = %order.order_id, "payment already claimed or resolved, skipping");
        return Ok(());
    }

    let processor = MockPaymentProcessor::new(config.payment_success_rate);
    let mut attempts = 0u32;
    let mut error_history = Vec::new();

    let outcome = loop {
        attempts += 1;
        match processor.process_payment(&order).await {
            ProcessorOutcome::Succeeded { transaction_id } => {
                break ProcessorOutcome::Succeeded { transaction_id };
            }
            ProcessorOutcome::Failed { code, message } => {
                error_history.push(serde_json::json!({
                    "attempt": attempts,
                    "code": code.as_str(),
                    "message": message,
                }));

                if code.is_transient() && attempts <= config.max_retries {
                    let delay = backoff_with_jitter(config.retry_base_backoff, attempts);
                    tracing::warn!(
                        order_id = %order.order_id,
                        attempt = attempts,
                        code = code.as_str(),
                        delay_ms = delay.as_millis() as u64,
                        "transient payment failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }

                break ProcessorOutcome::Failed { code, message };
            }
        }
    };

    match outcome {
        ProcessorOutcome::Succeeded { transaction_id } => {
            complete_success(pool, &order, &transaction_id, attempts, error_history, correlation_id).await
        }
        ProcessorOutcome::Failed { code, message } => {
            complete_failure(pool, &order, code, &message, attempts, error_history, correlation_id).await
        }
    }
}

/// Insert-if-absent the Payment row as `PENDING`, then atomically claim
/// it by moving `PENDING -> PROCESSING`. Returns `false` if another
/// instance already claimed it or it already reached a terminal state.
async fn claim_for_processing(
    pool: &PgPool,
    order: &OrderConfirmedPayload,
    correlation_id: Option<&str>,
) -> anyhow::Result<bool> {
    sqlx::query(
        r#"
        INSERT INTO payments (order_id, status, amount, currency, attempts, error_history, correlation_id)
        VALUES ($1, 'PENDING', $2, $3, 0, '[]', $4)
        ON CONFLICT (order_id) DO NOTHING
        "#,
    )
    .bind(&order.order_id)
    .bind(order.total_price)
    .bind(&order.currency)
    .bind(correlation_id)
    .execute(pool)
    .await?;

    let claimed = sqlx::query("UPDATE payments SET status = 'PROCESSING' WHERE order_id = $1 AND status = 'PENDING'")
        .bind(&order.order_id)
        .execute(pool)
        .await?;

    Ok(claimed.rows_affected() > 0)
}

async fn complete_success(
    pool: &PgPool,
    order: &OrderConfirmedPayload,
    transaction_id: &str,
    attempts: u32,
    error_history: Vec<serde_json::Value>,
    correlation_id: Option<String>,
) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        r#"
        UPDATE payments
        SET status = 'SUCCEEDED', transaction_id = $2, attempts = $3,
            error_history = $4, processed_at = NOW()
        WHERE order_id = $1 AND status = 'PROCESSING'
        "#,
    )
    .bind(&order.order_id)
    .bind(transaction_id)
    .bind(attempts as i32)
    .bind(serde_json::Value::Array(error_history))
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        tx.rollback().await?;
        tracing::warn!(order_id = %order.order_id, "payment row no longer in PROCESSING, abandoning success completion");
        return Ok(());
    }

    let payload = PaymentSucceededPayload {
        order_id: order.order_id.clone(),
        amount: order.total_price,
        currency: order.currency.clone(),
        transaction_id: transaction_id.to_string(),
    };

    let outbox = OutboxManager::new(OUTBOX_TABLE);
    let inserted = outbox
        .create_event(
            &mut tx,
            NewOutboxEvent {
                event_id: deterministic_event_id("payment-succeeded", &order.order_id),
                aggregate_id: order.order_id.clone(),
                aggregate_type: "payment".to_string(),
                event_type: "payment.succeeded".to_string(),
                payload: serde_json::to_value(&payload)?,
                routing_key: "payment.succeeded".to_string(),
                metadata: OutboxMetadata {
                    correlation_id: correlation_id.clone(),
                    causation_id: None,
                    service: "payments".to_string(),
                },
                max_retries: 5,
            },
        )
        .await?;

    if !inserted {
        // Another instance already published this outcome for this order.
        tx.rollback().await?;
        tracing::info!(order_id = %order.order_id, "payment.succeeded already enqueued by another instance");
        return Ok(());
    }

    tx.commit().await?;
    tracing::info!(order_id = %order.order_id, transaction_id, "payment succeeded");
    Ok(())
}

async fn complete_failure(
    pool: &PgPool,
    order: &OrderConfirmedPayload,
    code: FailureCode,
    message: &str,
    attempts: u32,
    error_history: Vec<serde_json::Value>,
    correlation_id: Option<String>,
) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        r#"
        UPDATE payments
        SET status = 'FAILED', reason = $2, attempts = $3, error_history = $4
        WHERE order_id = $1 AND status = 'PROCESSING'
        "#,
    )
    .bind(&order.order_id)
    .bind(message)
    .bind(attempts as i32)
    .bind(serde_json::Value::Array(error_history))
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        tx.rollback().await?;
        tracing::warn!(order_id = %order.order_id, "payment row no longer in PROCESSING, abandoning failure completion");
        return Ok(());
    }

    let payload = PaymentFailedPayload {
        order_id: order.order_id.clone(),
        products: order.products.clone(),
        reason: message.to_string(),
        failure_code: code,
    };

    let outbox = OutboxManager::new(OUTBOX_TABLE);
    let inserted = outbox
        .create_event(
            &mut tx,
            NewOutboxEvent {
                event_id: deterministic_event_id("payment-failed", &order.order_id),
                aggregate_id: order.order_id.clone(),
                aggregate_type: "payment".to_string(),
                event_type: "payment.failed".to_string(),
                payload: serde_json::to_value(&payload)?,
                routing_key: "payment.failed".to_string(),
                metadata: OutboxMetadata {
                    correlation_id,
                    causation_id: None,
                    service: "payments".to_string(),
                },
                max_retries: 5,
            },
        )
        .await?;

    if !inserted {
        tx.rollback().await?;
        tracing::info!(order_id = %order.order_id, "payment.failed already enqueued by another instance");
        return Ok(());
    }

    tx.commit().await?;
    tracing::warn!(order_id = %order.order_id, code = code.as_str(), "payment failed");
    Ok(())
}

fn backoff_with_jitter(base: std::time::Duration, attempt: u32) -> std::time::Duration {
    let exp = base.as_millis() as u64 * (1u64 << attempt.min(10));
    let jitter_span = exp / 4;
    let jitter = fastrand::u64(0..=jitter_span.max(1));
    let signed = if fastrand::bool() { exp + jitter } else { exp.saturating_sub(jitter) };
    std::time::Duration::from_millis(signed.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_ids_are_stable_and_distinct_per_kind() {
        let a = deterministic_event_id("payment-succeeded", "order-1");
        let b = deterministic_event_id("payment-succeeded", "order-1");
        let c = deterministic_event_id("payment-failed", "order-1");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn backoff_grows_with_attempt() {
        let first = backoff_with_jitter(std::time::Duration::from_millis(100), 1);
        let third = backoff_with_jitter(std::time::Duration::from_millis(100), 3);
        assert!(third.as_millis() > first.as_millis() / 2);
    }
}
