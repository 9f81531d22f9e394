use event_bus::{EventBus, InMemoryBus};
use outbox::Relay;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use orders_rs::Config;

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

    let relay = Relay::new(pool.clone(), bus.clone(), "orders_events_outbox");
    tokio::spawn(async move {
        relay.run(Duration::from_millis(500)).await;
    });

    orders_rs::start_saga_consumers(bus, pool.clone(), config.clone()).await;

    let app = orders_rs::http::router(pool);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "orders module listening");

    let listener = tokio::net::TcpListener::bind(addr).await.expect("failed to bind");
    axum::serve(listener, app).await.expect("server failed to start");
}
