/// Integration tests against a real Redis instance exercising the
/// reservation/release scripts end-to-end: oversold resistance, the
/// already-purchased sentinel, and release idempotency.
use seckill_rs::models::ReserveOutcome;
use seckill_rs::SeckillStore;
use serial_test::serial;
use uuid::Uuid;

async fn setup_store() -> (SeckillStore, String) {
    dotenvy::dotenv().ok();
    let redis_url = std::env::var("REDIS_URL").expect("REDIS_URL must be set for tests");
    let store = SeckillStore::new(&redis_url).await.expect("failed to connect to test Redis");
    let product_id = format!("p-{}", Uuid::new_v4());
    (store, product_id)
}

#[tokio::test]
#[serial]
async fn reserve_grants_exactly_available_stock_and_then_rejects() {
    let (store, product_id) = setup_store().await;
    let start = chrono::Utc::now() - chrono::Duration::minutes(1);
    let end = chrono::Utc::now() + chrono::Duration::hours(1);
    store.init_campaign(&product_id, 2, 9.99, start, end).await.unwrap();

    let o1 = store.reserve(&product_id, "user-1", 100, 60).await.unwrap();
    let o2 = store.reserve(&product_id, "user-2", 100, 60).await.unwrap();
    let o3 = store.reserve(&product_id, "user-3", 100, 60).await.unwrap();

    assert_eq!(o1, ReserveOutcome::Won);
    assert_eq!(o2, ReserveOutcome::Won);
    assert_eq!(o3, ReserveOutcome::OutOfStock);

    let status = store.status(&product_id).await.unwrap().unwrap();
    assert_eq!(status.stock_remaining, 0);
}

#[tokio::test]
#[serial]
async fn same_user_cannot_win_twice() {
    let (store, product_id) = setup_store().await;
    let start = chrono::Utc::now() - chrono::Duration::minutes(1);
    let end = chrono::Utc::now() + chrono::Duration::hours(1);
    store.init_campaign(&product_id, 5, 9.99, start, end).await.unwrap();

    let first = store.reserve(&product_id, "user-1", 100, 60).await.unwrap();
    let second = store.reserve(&product_id, "user-1", 100, 60).await.unwrap();

    assert_eq!(first, ReserveOutcome::Won);
    assert_eq!(second, ReserveOutcome::AlreadyPurchased);
}

#[tokio::test]
#[serial]
async fn reserve_against_uninitialised_campaign_reports_not_started() {
    let (store, product_id) = setup_store().await;
    let outcome = store.reserve(&product_id, "user-1", 100, 60).await.unwrap();
    assert_eq!(outcome, ReserveOutcome::CampaignNotStarted);
}

#[tokio::test]
#[serial]
async fn reserve_rejects_once_rate_limit_window_is_exceeded() {
    let (store, product_id) = setup_store().await;
    let start = chrono::Utc::now() - chrono::Duration::minutes(1);
    let end = chrono::Utc::now() + chrono::Duration::hours(1);
    store.init_campaign(&product_id, 100, 9.99, start, end).await.unwrap();

    // Each call below uses a distinct userId, so the rate limit (keyed
    // per product+user) is what's actually being exercised, not the
    // already-purchased check.
    for i in 0..3 {
        let outcome = store.reserve(&product_id, &format!("user-{i}"), 100, 60).await.unwrap();
        assert_eq!(outcome, ReserveOutcome::Won);
    }

    let limited = store.reserve(&product_id, "user-limited", 0, 60).await.unwrap();
    assert_eq!(limited, ReserveOutcome::RateLimited);
}

#[tokio::test]
#[serial]
async fn release_returns_stock_and_is_idempotent() {
    let (store, product_id) = setup_store().await;
    let start = chrono::Utc::now() - chrono::Duration::minutes(1);
    let end = chrono::Utc::now() + chrono::Duration::hours(1);
    store.init_campaign(&product_id, 1, 9.99, start, end).await.unwrap();

    store.reserve(&product_id, "user-1", 100, 60).await.unwrap();
    let released = store.release(&product_id, "user-1").await.unwrap();
    assert!(released);

    let status = store.status(&product_id).await.unwrap().unwrap();
    assert_eq!(status.stock_remaining, 1);

    // Releasing again (e.g. a redelivered compensation event) must be
    // a no-op, not a double-credit.
    let released_again = store.release(&product_id, "user-1").await.unwrap();
    assert!(!released_again);
    let status = store.status(&product_id).await.unwrap().unwrap();
    assert_eq!(status.stock_remaining, 1);
}

#[tokio::test]
#[serial]
async fn status_for_unknown_campaign_is_none() {
    let (store, product_id) = setup_store().await;
    assert!(store.status(&product_id).await.unwrap().is_none());
}
