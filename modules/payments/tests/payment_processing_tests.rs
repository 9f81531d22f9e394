/// Integration tests for the order.confirmed -> payment handling flow:
/// connect to a real Postgres test database, run migrations, exercise
/// the handler directly, then inspect the resulting rows.
use payments_rs::models::{OrderConfirmedPayload, OrderLineItem};
use payments_rs::{handle_order_confirmed, Config};
use serial_test::serial;
use sqlx::postgres::PgPoolOptions;

async fn setup_test_db() -> sqlx::PgPool {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("failed to connect to test database");

    sqlx::migrate!("./db/migrations").run(&pool).await.expect("failed to run migrations");

    pool
}

async fn cleanup(pool: &sqlx::PgPool, order_id: &str) {
    sqlx::query("DELETE FROM payments WHERE order_id = $1").bind(order_id).execute(pool).await.ok();
    sqlx::query("DELETE FROM payments_events_outbox WHERE aggregate_id = $1").bind(order_id).execute(pool).await.ok();
}

fn always_succeeds_config() -> Config {
    Config {
        database_url: String::new(),
        bus_type: "inmemory".to_string(),
        nats_url: String::new(),
        host: "0.0.0.0".to_string(),
        port: 0,
        payment_success_rate: 1.0,
        max_retries: 3,
        retry_base_backoff: std::time::Duration::from_millis(1),
    }
}

fn always_fails_config() -> Config {
    Config {
        payment_success_rate: 0.0,
        ..always_succeeds_config()
    }
}

fn sample_order(order_id: &str) -> OrderConfirmedPayload {
    OrderConfirmedPayload {
        order_id: order_id.to_string(),
        products: vec![OrderLineItem { product_id: "p1".to_string(), quantity: 2, unit_price: 25.0 }],
        total_price: 50.0,
        currency: "USD".to_string(),
    }
}

#[tokio::test]
#[serial]
async fn successful_payment_enqueues_payment_succeeded() {
    let pool = setup_test_db().await;
    let order_id = "order-success-1";
    cleanup(&pool, order_id).await;

    let config = always_succeeds_config();
    handle_order_confirmed(&pool, &config, sample_order(order_id), Some("corr-1".to_string()))
        .await
        .expect("handler should succeed");

    let status: (String,) = sqlx::query_as("SELECT status FROM payments WHERE order_id = $1")
        .bind(order_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status.0, "SUCCEEDED");

    let outbox_count: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM payments_events_outbox WHERE aggregate_id = $1 AND event_type = 'payment.succeeded'",
    )
    .bind(order_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(outbox_count.0, 1);

    cleanup(&pool, order_id).await;
}

#[tokio::test]
#[serial]
async fn exhausted_retries_enqueue_payment_failed() {
    let pool = setup_test_db().await;
    let order_id = "order-fail-1";
    cleanup(&pool, order_id).await;

    let config = always_fails_config();
    handle_order_confirmed(&pool, &config, sample_order(order_id), None)
        .await
        .expect("handler should complete even on gateway failure");

    let row: (String, i32) = sqlx::query_as("SELECT status, attempts FROM payments WHERE order_id = $1")
        .bind(order_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(row.0, "FAILED");
    assert!(row.1 >= 1);

    let outbox_count: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM payments_events_outbox WHERE aggregate_id = $1 AND event_type = 'payment.failed'",
    )
    .bind(order_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(outbox_count.0, 1);

    cleanup(&pool, order_id).await;
}

#[tokio::test]
#[serial]
async fn reprocessing_same_order_does_not_duplicate_payment_row() {
    let pool = setup_test_db().await;
    let order_id = "order-idempotent-1";
    cleanup(&pool, order_id).await;

    let config = always_succeeds_config();
    handle_order_confirmed(&pool, &config, sample_order(order_id), None).await.unwrap();
    // A second order.confirmed for the same order (e.g. redelivery) must
    // be a no-op: the row is already SUCCEEDED, not PENDING, so the
    // claim step finds nothing to claim.
    handle_order_confirmed(&pool, &config, sample_order(order_id), None).await.unwrap();

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM payments WHERE order_id = $1")
        .bind(order_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count.0, 1);

    let outbox_count: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM payments_events_outbox WHERE aggregate_id = $1 AND event_type = 'payment.succeeded'",
    )
    .bind(order_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(outbox_count.0, 1);

    cleanup(&pool, order_id).await;
}
