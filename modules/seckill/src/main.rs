use event_bus::{EventBus, InMemoryBus};
use seckill_rs::http::AppState;
use seckill_rs::{Config, SeckillStore};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Arc::new(Config::from_env());

    tracing::info!("connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    tracing::info!("running migrations...");
    sqlx::migrate!("./db/migrations").run(&pool).await.expect("failed to run migrations");

    let bus: Arc<dyn EventBus> = match config.bus_type.to_lowercase().as_str() {
        "inmemory" => {
            tracing::info!("using in-memory event bus");
            Arc::new(InMemoryBus::new())
        }
        "nats" => {
            tracing::info!(nats_url = %config.nats_url, "connecting to NATS");
            let client = async_nats::connect(&config.nats_url).await.expect("failed to connect to NATS");
            Arc::new(event_bus::NatsBus::new(client))
        }
        other => panic!("invalid BUS_TYPE: {other}. must be 'inmemory' or 'nats'"),
    };

    tracing::info!("connecting to Redis...");
    let store = SeckillStore::new(&config.redis_url).await.expect("failed to connect to Redis");

    seckill_rs::start_release_consumer(bus.clone(), pool.clone(), store.clone()).await;

    let replay_pool = pool.clone();
    let replay_bus = bus.clone();
    tokio::spawn(async move {
        seckill_rs::ghost_journal::run_replay_loop(replay_pool, replay_bus, Duration::from_secs(5)).await;
    });

    let app = seckill_rs::http::router(AppState { store, bus, pool, config: config.clone() }).layer(
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    );

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "seckill module listening");

    let listener = tokio::net::TcpListener::bind(addr).await.expect("failed to bind");
    axum::serve(listener, app).await.expect("server failed to start");
}
