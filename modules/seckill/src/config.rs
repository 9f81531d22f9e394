#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bus_type: String,
    pub nats_url: String,
    pub host: String,
    pub port: u16,
    pub redis_url: String,
    pub rate_limit: u32,
    pub rate_window_secs: u32,
    pub admin_key: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            bus_type: std::env::var("BUS_TYPE").unwrap_or_else(|_| "inmemory".to_string()),
            nats_url: std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT").unwrap_or_else(|_| "8083".to_string()).parse().expect("PORT must be a valid u16"),
            redis_url: std::env::var("REDIS_URL").expect("REDIS_URL must be set"),
            rate_limit: std::env::var("SECKILL_RATE_LIMIT").ok().and_then(|v| v.parse().ok()).unwrap_or(5),
            rate_window_secs: std::env::var("SECKILL_RATE_WINDOW").ok().and_then(|v| v.parse().ok()).unwrap_or(10),
            admin_key: std::env::var("SECKILL_ADMIN_KEY").expect("SECKILL_ADMIN_KEY must be set"),
        }
    }
}
