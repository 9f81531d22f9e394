use serde::{Deserialize, Serialize};

/// Sentinel return codes from the reserve script, in the order spec'd:
/// rate limit, campaign absent, already purchased, out of stock, won.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Won,
    RateLimited,
    CampaignNotStarted,
    AlreadyPurchased,
    OutOfStock,
}

impl ReserveOutcome {
    /// Maps a reserve script's integer sentinel to the outcome it
    /// represents. Any value outside the documented set is treated as
    /// an internal error by the caller, not covered here.
    pub fn from_script_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Won),
            -4 => Some(Self::RateLimited),
            -3 => Some(Self::CampaignNotStarted),
            -2 => Some(Self::AlreadyPurchased),
            -1 => Some(Self::OutOfStock),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SeckillError {
    #[error("store error: {0}")]
    Store(String),
    #[error("unexpected script return code: {0}")]
    UnexpectedScriptCode(i64),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuyRequest {
    pub product_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuyResponse {
    pub correlation_id: String,
}

/// The business-level result of a buy attempt. Every rejection reason
/// is a normal outcome, not an error — only actual store/serialization
/// failures are `SeckillError`.
#[derive(Debug, Clone)]
pub enum BuyOutcome {
    Won(BuyResponse),
    Rejected(ReserveOutcome),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignStatus {
    pub stock_remaining: i64,
    pub total_stock: i64,
    pub price: f64,
    pub is_active: bool,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminInitRequest {
    pub product_id: String,
    pub stock: i64,
    pub price: f64,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminReleaseRequest {
    pub product_id: String,
    pub user_id: String,
}

/// Inbound `order.seckill.release`: the compensation path when the
/// order a seckill win fed into is later cancelled.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderSeckillReleasePayload {
    pub product_id: String,
    pub user_id: String,
}

/// Outbound `seckill.order.won`, published directly (not via the
/// transactional outbox: there is no business row in this module's own
/// datastore to commit it alongside) and appended to the ghost-order
/// journal if that publish fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeckillOrderWonPayload {
    pub product_id: String,
    pub user_id: String,
    pub price: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_code_maps_to_documented_outcomes() {
        assert_eq!(ReserveOutcome::from_script_code(1), Some(ReserveOutcome::Won));
        assert_eq!(ReserveOutcome::from_script_code(-4), Some(ReserveOutcome::RateLimited));
        assert_eq!(ReserveOutcome::from_script_code(-3), Some(ReserveOutcome::CampaignNotStarted));
        assert_eq!(ReserveOutcome::from_script_code(-2), Some(ReserveOutcome::AlreadyPurchased));
        assert_eq!(ReserveOutcome::from_script_code(-1), Some(ReserveOutcome::OutOfStock));
    }

    #[test]
    fn unrecognised_script_code_is_none() {
        assert_eq!(ReserveOutcome::from_script_code(42), None);
    }
}
