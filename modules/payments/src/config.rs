use std::time::Duration;

/// Module configuration, parsed once at startup the way every module
/// in the platform reads its own `Config::from_env()`.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bus_type: String,
    pub nats_url: String,
    pub host: String,
    pub port: u16,
    /// Fraction of mock-gateway attempts that succeed. Default matches
    /// a processor healthy enough that most orders complete without a
    /// retry, while still exercising the failure path regularly.
    pub payment_success_rate: f64,
    pub max_retries: u32,
    pub retry_base_backoff: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            bus_type: std::env::var("BUS_TYPE").unwrap_or_else(|_| "inmemory".to_string()),
            nats_url: std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8088".to_string())
                .parse()
                .expect("PORT must be a valid u16"),
            payment_success_rate: std::env::var("PAYMENT_SUCCESS_RATE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.9),
            max_retries: std::env::var("PAYMENT_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            retry_base_backoff: Duration::from_millis(
                std::env::var("PAYMENT_RETRY_BASE_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(500),
            ),
        }
    }
}
