use axum::{routing::get, Json, Router};
use event_bus::{EventBus, InMemoryBus};
use outbox::Relay;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use payments_rs::Config;

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
    sqlx::migrate!("./db/migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

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

    let relay = Relay::new(pool.clone(), bus.clone(), "payments_events_outbox");
    tokio::spawn(async move {
        relay.run(Duration::from_millis(500)).await;
    });

    payments_rs::start_order_confirmed_consumer(bus.clone(), pool.clone(), config.clone()).await;

    let app = Router::new().route("/api/health", get(health)).layer(
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    );

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "payments module listening");

    let listener = tokio::net::TcpListener::bind(addr).await.expect("failed to bind");
    axum::serve(listener, app).await.expect("server failed to start");
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "module": "payments",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
