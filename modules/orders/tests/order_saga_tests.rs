/// Integration tests against a real Postgres test database exercising
/// order creation and the saga's guarded transitions end-to-end.
use orders_rs::models::{CreateOrderItem, CreateOrderRequest, SeckillOrderWonPayload};
use orders_rs::{create_order, Config};
use serial_test::serial;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

async fn setup_test_db() -> sqlx::PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");
    let pool = PgPoolOptions::new().max_connections(5).connect(&database_url).await.expect("failed to connect to test database");
    sqlx::migrate!("./db/migrations").run(&pool).await.expect("failed to run migrations");
    pool
}

async fn cleanup(pool: &sqlx::PgPool, order_id: &str) {
    sqlx::query("DELETE FROM orders WHERE order_id = $1").bind(order_id).execute(pool).await.ok();
    sqlx::query("DELETE FROM orders_events_outbox WHERE aggregate_id = $1").bind(order_id).execute(pool).await.ok();
}

fn config() -> Config {
    Config {
        database_url: String::new(),
        bus_type: "inmemory".to_string(),
        nats_url: String::new(),
        host: "0.0.0.0".to_string(),
        port: 0,
        currency: "USD".to_string(),
    }
}

#[tokio::test]
#[serial]
async fn create_order_persists_pending_row_and_outbox_event() {
    let pool = setup_test_db().await;

    let req = CreateOrderRequest {
        user_id: "user-1".to_string(),
        items: vec![CreateOrderItem { product_id: "p1".to_string(), quantity: 2, unit_price: 50.0 }],
    };

    let resp = create_order(&pool, req).await.expect("order creation should succeed");
    assert_eq!(resp.status, "PENDING");
    assert_eq!(resp.total_price, 100.0);

    let status: (String,) = sqlx::query_as("SELECT status FROM orders WHERE order_id = $1").bind(&resp.order_id).fetch_one(&pool).await.unwrap();
    assert_eq!(status.0, "PENDING");

    let outbox_count: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM orders_events_outbox WHERE aggregate_id = $1 AND event_type = 'order.created'")
            .bind(&resp.order_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(outbox_count.0, 1);

    cleanup(&pool, &resp.order_id).await;
}

#[tokio::test]
#[serial]
async fn create_order_rejects_non_positive_quantity() {
    let pool = setup_test_db().await;
    let req = CreateOrderRequest {
        user_id: "user-1".to_string(),
        items: vec![CreateOrderItem { product_id: "p1".to_string(), quantity: 0, unit_price: 50.0 }],
    };
    let err = create_order(&pool, req).await.unwrap_err();
    assert!(matches!(err, orders_rs::OrderError::InvalidQuantity));
}

#[tokio::test]
#[serial]
async fn full_saga_reaches_paid() {
    let pool = setup_test_db().await;
    let cfg = config();

    let req = CreateOrderRequest {
        user_id: "user-1".to_string(),
        items: vec![CreateOrderItem { product_id: "p1".to_string(), quantity: 2, unit_price: 50.0 }],
    };
    let resp = create_order(&pool, req).await.unwrap();

    orders_rs::handlers::handle_inventory_reserved_success(&pool, &cfg, &resp.order_id, None).await.unwrap();
    let status: (String,) = sqlx::query_as("SELECT status FROM orders WHERE order_id = $1").bind(&resp.order_id).fetch_one(&pool).await.unwrap();
    assert_eq!(status.0, "CONFIRMED");

    orders_rs::handlers::handle_payment_succeeded(&pool, &cfg, &resp.order_id, None).await.unwrap();
    let status: (String,) = sqlx::query_as("SELECT status FROM orders WHERE order_id = $1").bind(&resp.order_id).fetch_one(&pool).await.unwrap();
    assert_eq!(status.0, "PAID");

    // A redelivered payment.succeeded against an already-PAID (terminal) order must be a no-op.
    orders_rs::handlers::handle_payment_succeeded(&pool, &cfg, &resp.order_id, None).await.unwrap();
    let status: (String,) = sqlx::query_as("SELECT status FROM orders WHERE order_id = $1").bind(&resp.order_id).fetch_one(&pool).await.unwrap();
    assert_eq!(status.0, "PAID");

    cleanup(&pool, &resp.order_id).await;
}

#[tokio::test]
#[serial]
async fn payment_failure_cancels_order_with_reason() {
    let pool = setup_test_db().await;
    let cfg = config();

    let req = CreateOrderRequest {
        user_id: "user-1".to_string(),
        items: vec![CreateOrderItem { product_id: "p1".to_string(), quantity: 1, unit_price: 10.0 }],
    };
    let resp = create_order(&pool, req).await.unwrap();

    orders_rs::handlers::handle_inventory_reserved_success(&pool, &cfg, &resp.order_id, None).await.unwrap();
    orders_rs::handlers::handle_payment_failed(&pool, &cfg, &resp.order_id, "card declined by issuer", None).await.unwrap();

    let row: (String, Option<String>) =
        sqlx::query_as("SELECT status, cancellation_reason FROM orders WHERE order_id = $1").bind(&resp.order_id).fetch_one(&pool).await.unwrap();
    assert_eq!(row.0, "CANCELLED");
    assert_eq!(row.1.as_deref(), Some("card declined by issuer"));

    cleanup(&pool, &resp.order_id).await;
}

#[tokio::test]
#[serial]
async fn seckill_win_creates_order_already_confirmed() {
    let pool = setup_test_db().await;
    let cfg = config();
    let event_id = Uuid::new_v4().to_string();
    let payload = SeckillOrderWonPayload {
        product_id: "flash-p1".to_string(),
        user_id: "user-42".to_string(),
        price: 19.99,
    };

    orders_rs::handle_seckill_order_won(&pool, &cfg, &event_id, &payload, None).await.unwrap();

    let row: (String, String) = sqlx::query_as("SELECT status, source FROM orders WHERE user_id = $1").bind(&payload.user_id).fetch_one(&pool).await.unwrap();
    assert_eq!(row.0, "CONFIRMED");
    assert_eq!(row.1, "seckill");

    let outbox_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders_events_outbox WHERE event_type = 'order.confirmed' AND payload->>'order_id' IN (SELECT order_id FROM orders WHERE user_id = $1)")
        .bind(&payload.user_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(outbox_count.0, 1);

    // A redelivery of the same winning event must not create a second order.
    orders_rs::handle_seckill_order_won(&pool, &cfg, &event_id, &payload, None).await.unwrap();
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE user_id = $1").bind(&payload.user_id).fetch_one(&pool).await.unwrap();
    assert_eq!(count.0, 1);

    sqlx::query("DELETE FROM orders WHERE user_id = $1").bind(&payload.user_id).execute(&pool).await.ok();
    sqlx::query("DELETE FROM orders_events_outbox WHERE payload->>'order_id' NOT IN (SELECT order_id FROM orders)").execute(&pool).await.ok();
}

#[tokio::test]
#[serial]
async fn seckill_order_payment_failure_emits_seckill_release_not_inventory_release() {
    let pool = setup_test_db().await;
    let cfg = config();
    let event_id = Uuid::new_v4().to_string();
    let payload = SeckillOrderWonPayload {
        product_id: "flash-p2".to_string(),
        user_id: "user-43".to_string(),
        price: 29.99,
    };
    orders_rs::handle_seckill_order_won(&pool, &cfg, &event_id, &payload, None).await.unwrap();
    let order_id: (String,) = sqlx::query_as("SELECT order_id FROM orders WHERE user_id = $1").bind(&payload.user_id).fetch_one(&pool).await.unwrap();

    orders_rs::handlers::handle_payment_failed(&pool, &cfg, &order_id.0, "card declined", None).await.unwrap();

    let release_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders_events_outbox WHERE aggregate_id = $1 AND event_type = 'order.seckill.release'")
        .bind(&order_id.0)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(release_count.0, 1);

    cleanup(&pool, &order_id.0).await;
}
