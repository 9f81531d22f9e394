use crate::models::{CampaignStatus, ReserveOutcome, SeckillError};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};

/// Reserve a unit of stock for `user_id` against `product_id`. All five
/// steps (rate-limit bump, campaign-exists check, already-purchased
/// check, stock check, decrement+winner-add) run as one atomic script
/// execution: no process ever reads stock/winners and then writes back
/// outside this script.
const RESERVE_SCRIPT: &str = r#"
local count = redis.call("INCR", KEYS[3])
if count == 1 then
    redis.call("EXPIRE", KEYS[3], ARGV[2])
end
if count > tonumber(ARGV[1]) then
    return -4
end
if redis.call("EXISTS", KEYS[1]) == 0 then
    return -3
end
if redis.call("SISMEMBER", KEYS[2], ARGV[3]) == 1 then
    return -2
end
local stock = tonumber(redis.call("GET", KEYS[1]))
if stock <= 0 then
    return -1
end
redis.call("DECR", KEYS[1])
redis.call("SADD", KEYS[2], ARGV[3])
return 1
"#;

/// Remove `user_id` from winners and, if present, increment stock back.
/// Idempotent: releasing a user who isn't a winner (already released,
/// or never won) returns the `-1` sentinel rather than erroring.
const RELEASE_SCRIPT: &str = r#"
local removed = redis.call("SREM", KEYS[1], ARGV[1])
if removed == 1 then
    redis.call("INCR", KEYS[2])
    return 1
else
    return -1
end
"#;

#[derive(Clone)]
pub struct SeckillStore {
    conn_manager: ConnectionManager,
}

impl SeckillStore {
    pub async fn new(redis_url: &str) -> Result<Self, SeckillError> {
        let client = Client::open(redis_url).map_err(|e| SeckillError::Store(format!("failed to create Redis client: {e}")))?;
        let conn_manager = ConnectionManager::new(client).await.map_err(|e| SeckillError::Store(format!("failed to create Redis connection manager: {e}")))?;
        Ok(Self { conn_manager })
    }

    fn stock_key(product_id: &str) -> String {
        format!("seckill:{product_id}:stock")
    }

    fn winners_key(product_id: &str) -> String {
        format!("seckill:{product_id}:winners")
    }

    fn ratelimit_key(product_id: &str, user_id: &str) -> String {
        format!("seckill:{product_id}:ratelimit:{user_id}")
    }

    fn meta_key(product_id: &str) -> String {
        format!("seckill:{product_id}:meta")
    }

    pub async fn reserve(&self, product_id: &str, user_id: &str, rate_limit: u32, rate_window_secs: u32) -> Result<ReserveOutcome, SeckillError> {
        let mut conn = self.conn_manager.clone();
        let code: i64 = Script::new(RESERVE_SCRIPT)
            .key(Self::stock_key(product_id))
            .key(Self::winners_key(product_id))
            .key(Self::ratelimit_key(product_id, user_id))
            .arg(rate_limit)
            .arg(rate_window_secs)
            .arg(user_id)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| SeckillError::Store(format!("reserve script failed: {e}")))?;

        ReserveOutcome::from_script_code(code).ok_or(SeckillError::UnexpectedScriptCode(code))
    }

    /// Returns `true` if a unit was actually returned to stock, `false`
    /// if `user_id` was not found among winners (already released, or
    /// never won) — both are treated as success by the caller.
    pub async fn release(&self, product_id: &str, user_id: &str) -> Result<bool, SeckillError> {
        let mut conn = self.conn_manager.clone();
        let code: i64 = Script::new(RELEASE_SCRIPT)
            .key(Self::winners_key(product_id))
            .key(Self::stock_key(product_id))
            .arg(user_id)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| SeckillError::Store(format!("release script failed: {e}")))?;

        Ok(code == 1)
    }

    /// (Re-)initialise a campaign: writes stock and metadata, and
    /// clears winners. Re-initialisation is allowed and deliberately
    /// clears winners — `|winners| + stock = total` must hold for the
    /// *current* campaign generation, not any prior one.
    pub async fn init_campaign(&self, product_id: &str, stock: i64, price: f64, start_time: chrono::DateTime<chrono::Utc>, end_time: chrono::DateTime<chrono::Utc>) -> Result<(), SeckillError> {
        let mut conn = self.conn_manager.clone();
        let meta = Self::meta_key(product_id);
        let _: () = redis::pipe()
            .atomic()
            .set(Self::stock_key(product_id), stock)
            .ignore()
            .del(Self::winners_key(product_id))
            .ignore()
            .hset(&meta, "total", stock)
            .ignore()
            .hset(&meta, "price", price)
            .ignore()
            .hset(&meta, "start_time", start_time.to_rfc3339())
            .ignore()
            .hset(&meta, "end_time", end_time.to_rfc3339())
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| SeckillError::Store(format!("campaign init failed: {e}")))?;
        Ok(())
    }

    pub async fn status(&self, product_id: &str) -> Result<Option<CampaignStatus>, SeckillError> {
        let mut conn = self.conn_manager.clone();
        let stock: Option<i64> = conn.get(Self::stock_key(product_id)).await.map_err(|e| SeckillError::Store(format!("status GET failed: {e}")))?;
        let Some(stock) = stock else {
            return Ok(None);
        };

        let meta: std::collections::HashMap<String, String> =
            conn.hgetall(Self::meta_key(product_id)).await.map_err(|e| SeckillError::Store(format!("status HGETALL failed: {e}")))?;

        let total_stock = meta.get("total").and_then(|v| v.parse().ok()).unwrap_or(stock);
        let price = meta.get("price").and_then(|v| v.parse().ok()).unwrap_or(0.0);
        let start_time = meta.get("start_time").and_then(|v| chrono::DateTime::parse_from_rfc3339(v).ok()).map(|d| d.with_timezone(&chrono::Utc)).unwrap_or_else(chrono::Utc::now);
        let end_time = meta.get("end_time").and_then(|v| chrono::DateTime::parse_from_rfc3339(v).ok()).map(|d| d.with_timezone(&chrono::Utc)).unwrap_or_else(chrono::Utc::now);
        let now = chrono::Utc::now();
        let is_active = now >= start_time && now <= end_time && stock > 0;

        Ok(Some(CampaignStatus {
            stock_remaining: stock,
            total_stock,
            price,
            is_active,
            start_time,
            end_time,
        }))
    }
}
