/// Integration tests against a real Postgres test database exercising
/// the reservation/release engine end-to-end. Locking uses `NullLock`
/// since these tests run against a single instance.
use distributed_lock::NullLock;
use inventory_rs::models::{OrderLineItem, ReserveOutcome};
use inventory_rs::{release, reserve_batch};
use serial_test::serial;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use uuid::Uuid;

async fn setup_test_db() -> sqlx::PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");
    let pool = PgPoolOptions::new().max_connections(5).connect(&database_url).await.expect("failed to connect to test database");
    sqlx::migrate!("./db/migrations").run(&pool).await.expect("failed to run migrations");
    pool
}

async fn seed_product(pool: &sqlx::PgPool, product_id: &str, available: i32) {
    sqlx::query("INSERT INTO inventory (product_id, available, reserved) VALUES ($1, $2, 0) ON CONFLICT (product_id) DO UPDATE SET available = EXCLUDED.available, reserved = 0")
        .bind(product_id)
        .bind(available)
        .execute(pool)
        .await
        .unwrap();
}

async fn cleanup(pool: &sqlx::PgPool, product_ids: &[&str], order_id: &str) {
    for id in product_ids {
        sqlx::query("DELETE FROM inventory WHERE product_id = $1").bind(id).execute(pool).await.ok();
        sqlx::query("DELETE FROM inventory_audit WHERE product_id = $1").bind(id).execute(pool).await.ok();
    }
    sqlx::query("DELETE FROM inventory_events_outbox WHERE aggregate_id = $1").bind(order_id).execute(pool).await.ok();
}

#[tokio::test]
#[serial]
async fn reserve_batch_succeeds_and_decrements_stock() {
    let pool = setup_test_db().await;
    let lock = NullLock::new();
    let product_id = format!("p-{}", Uuid::new_v4());
    seed_product(&pool, &product_id, 10).await;

    let order_id = format!("order-{}", Uuid::new_v4());
    let items = vec![OrderLineItem { product_id: product_id.clone(), quantity: 4, unit_price: 9.99 }];

    let outcome = reserve_batch(&pool, &lock, Duration::from_secs(5), &order_id, None, items).await.unwrap();
    assert_eq!(outcome, ReserveOutcome::Success);

    let row: (i32, i32) = sqlx::query_as("SELECT available, reserved FROM inventory WHERE product_id = $1").bind(&product_id).fetch_one(&pool).await.unwrap();
    assert_eq!(row, (6, 4));

    let outbox_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM inventory_events_outbox WHERE aggregate_id = $1 AND event_type = 'inventory.reserved.success'")
        .bind(&order_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(outbox_count.0, 1);

    cleanup(&pool, &[&product_id], &order_id).await;
}

#[tokio::test]
#[serial]
async fn reserve_batch_reports_insufficient_stock_as_failed_outcome_not_error() {
    let pool = setup_test_db().await;
    let lock = NullLock::new();
    let product_id = format!("p-{}", Uuid::new_v4());
    seed_product(&pool, &product_id, 2).await;

    let order_id = format!("order-{}", Uuid::new_v4());
    let items = vec![OrderLineItem { product_id: product_id.clone(), quantity: 5, unit_price: 9.99 }];

    let outcome = reserve_batch(&pool, &lock, Duration::from_secs(5), &order_id, None, items).await.unwrap();
    match outcome {
        ReserveOutcome::Failed { product_id: failed_product, .. } => assert_eq!(failed_product.as_deref(), Some(product_id.as_str())),
        ReserveOutcome::Success => panic!("expected insufficient stock to be reported as a failed outcome"),
    }

    let row: (i32, i32) = sqlx::query_as("SELECT available, reserved FROM inventory WHERE product_id = $1").bind(&product_id).fetch_one(&pool).await.unwrap();
    assert_eq!(row, (2, 0), "a rejected reservation must not mutate stock");

    cleanup(&pool, &[&product_id], &order_id).await;
}

#[tokio::test]
#[serial]
async fn reserve_then_release_restores_availability() {
    let pool = setup_test_db().await;
    let lock = NullLock::new();
    let product_id = format!("p-{}", Uuid::new_v4());
    seed_product(&pool, &product_id, 10).await;

    let order_id = format!("order-{}", Uuid::new_v4());
    let items = vec![OrderLineItem { product_id: product_id.clone(), quantity: 4, unit_price: 9.99 }];
    reserve_batch(&pool, &lock, Duration::from_secs(5), &order_id, None, items).await.unwrap();

    release(&pool, &lock, Duration::from_secs(5), &product_id, 4, &order_id, None).await.unwrap();

    let row: (i32, i32) = sqlx::query_as("SELECT available, reserved FROM inventory WHERE product_id = $1").bind(&product_id).fetch_one(&pool).await.unwrap();
    assert_eq!(row, (10, 0));

    cleanup(&pool, &[&product_id], &order_id).await;
}

#[tokio::test]
#[serial]
async fn releasing_more_than_reserved_is_idempotent_not_an_error() {
    let pool = setup_test_db().await;
    let lock = NullLock::new();
    let product_id = format!("p-{}", Uuid::new_v4());
    seed_product(&pool, &product_id, 10).await;

    let order_id = format!("order-{}", Uuid::new_v4());
    let items = vec![OrderLineItem { product_id: product_id.clone(), quantity: 3, unit_price: 9.99 }];
    reserve_batch(&pool, &lock, Duration::from_secs(5), &order_id, None, items).await.unwrap();

    release(&pool, &lock, Duration::from_secs(5), &product_id, 3, &order_id, None).await.unwrap();
    // A second release for the same order (e.g. a redelivered compensation event) must not error or double-credit stock.
    release(&pool, &lock, Duration::from_secs(5), &product_id, 3, &order_id, None).await.unwrap();

    let row: (i32, i32) = sqlx::query_as("SELECT available, reserved FROM inventory WHERE product_id = $1").bind(&product_id).fetch_one(&pool).await.unwrap();
    assert_eq!(row, (10, 0));

    cleanup(&pool, &[&product_id], &order_id).await;
}
