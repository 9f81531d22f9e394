use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Reserve,
    Release,
    Restock,
    Adjust,
    Create,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reserve => "RESERVE",
            Self::Release => "RELEASE",
            Self::Restock => "RESTOCK",
            Self::Adjust => "ADJUST",
            Self::Create => "CREATE",
            Self::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InventoryRow {
    pub product_id: String,
    pub available: i32,
    pub reserved: i32,
    pub last_restocked_at: Option<chrono::NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub product_id: String,
    pub quantity: i32,
    #[serde(default)]
    pub unit_price: f64,
}

/// Incoming `order.created`: the set of lines the saga asks C3 to
/// reserve against.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderCreatedPayload {
    pub order_id: String,
    pub products: Vec<OrderLineItem>,
}

/// Incoming `payment.failed`: triggers the compensating release.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentFailedPayload {
    pub order_id: String,
    pub products: Vec<OrderLineItem>,
}

/// Incoming `order.cancelled`. Carries the same release obligation as
/// `payment.failed` for any cancellation path that isn't payment
/// related (e.g. a future manual admin cancel).
#[derive(Debug, Clone, Deserialize)]
pub struct OrderCancelledPayload {
    pub order_id: String,
    pub products: Vec<OrderLineItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductDeletedPayload {
    pub product_id: String,
}

/// Outbound `inventory.reserved.success`.
#[derive(Debug, Serialize)]
pub struct InventoryReservedSuccessPayload {
    pub order_id: String,
    pub products: Vec<OrderLineItem>,
}

/// Outbound `inventory.reserved.failed`.
#[derive(Debug, Serialize)]
pub struct InventoryReservedFailedPayload {
    pub order_id: String,
    pub reason: String,
    pub product_id: Option<String>,
}

/// Insufficient stock is a business outcome, not a transient error: it
/// is handled by emitting `inventory.reserved.failed` and acking the
/// message, never by retrying.
#[derive(Debug, Clone, PartialEq)]
pub enum ReserveOutcome {
    Success,
    Failed { product_id: Option<String>, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ReserveError {
    #[error(transparent)]
    Lock(#[from] distributed_lock::LockError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
