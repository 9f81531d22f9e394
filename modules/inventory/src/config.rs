#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bus_type: String,
    pub nats_url: String,
    pub host: String,
    pub port: u16,
    /// Redis URL for the distributed lock. `None` means single-instance
    /// mode: operations run unlocked, which is only safe when exactly
    /// one inventory instance is running.
    pub redis_url: Option<String>,
    pub lock_ttl_seconds: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            bus_type: std::env::var("BUS_TYPE").unwrap_or_else(|_| "inmemory".to_string()),
            nats_url: std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT").unwrap_or_else(|_| "8082".to_string()).parse().expect("PORT must be a valid u16"),
            redis_url: std::env::var("REDIS_URL").ok(),
            lock_ttl_seconds: std::env::var("INVENTORY_LOCK_TTL_SECONDS").ok().and_then(|v| v.parse().ok()).unwrap_or(5),
        }
    }
}
