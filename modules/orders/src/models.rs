use serde::{Deserialize, Serialize};

/// Authoritative order status. Transitions are owned entirely by the
/// FSM in `fsm.rs`; nothing else in this crate mutates an order's
/// status directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Paid,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Paid => "PAID",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "CONFIRMED" => Some(Self::Confirmed),
            "PAID" => Some(Self::Paid),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// PAID and CANCELLED are absorbing: nothing transitions out of them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub product_id: String,
    pub quantity: i32,
    pub unit_price: f64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderRow {
    pub order_id: String,
    pub user_id: String,
    pub products: serde_json::Value,
    pub total_price: f64,
    pub status: String,
    pub cancellation_reason: Option<String>,
    pub correlation_id: Option<String>,
    pub source: String,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderItem {
    pub product_id: String,
    pub quantity: i32,
    /// There is no product-catalogue service in this workspace to
    /// resolve a price server-side, so the caller supplies it. A real
    /// deployment would look this up via a Repository-backed product
    /// read model instead of trusting the request.
    pub unit_price: f64,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: String,
    pub items: Vec<CreateOrderItem>,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub order_id: String,
    pub status: &'static str,
    pub total_price: f64,
}

#[derive(Debug, Serialize)]
pub struct OrderView {
    pub order_id: String,
    pub user_id: String,
    pub products: serde_json::Value,
    pub total_price: f64,
    pub status: String,
    pub cancellation_reason: Option<String>,
}

impl From<OrderRow> for OrderView {
    fn from(row: OrderRow) -> Self {
        Self {
            order_id: row.order_id,
            user_id: row.user_id,
            products: row.products,
            total_price: row.total_price,
            status: row.status,
            cancellation_reason: row.cancellation_reason,
        }
    }
}

/// `order.created` outbox payload — the handoff to the inventory
/// reservation consumer.
#[derive(Debug, Serialize)]
pub struct OrderCreatedPayload {
    pub order_id: String,
    pub user_id: String,
    pub products: Vec<OrderLineItem>,
}

/// `order.confirmed` outbox payload — the handoff to the payment
/// consumer. Carries the full product list and price so payments never
/// has to read the order back.
#[derive(Debug, Serialize)]
pub struct OrderConfirmedPayload {
    pub order_id: String,
    pub total_price: f64,
    pub currency: String,
    pub products: Vec<OrderLineItem>,
}

/// `order.cancelled` outbox payload. Inventory's own consumer for
/// `payment.failed` independently triggers the release compensation;
/// this event exists for any other observer (e.g. notifications) that
/// cares about the terminal order outcome.
#[derive(Debug, Serialize)]
pub struct OrderCancelledPayload {
    pub order_id: String,
    pub products: Vec<OrderLineItem>,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InventoryReservedSuccessPayload {
    pub order_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InventoryReservedFailedPayload {
    pub order_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentSucceededPayload {
    pub order_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentFailedPayload {
    pub order_id: String,
    pub reason: String,
}

/// Inbound `seckill.order.won`: a flash-sale win that enters the saga
/// already CONFIRMED, bypassing PENDING and the inventory reservation
/// consumer entirely.
#[derive(Debug, Clone, Deserialize)]
pub struct SeckillOrderWonPayload {
    pub product_id: String,
    pub user_id: String,
    pub price: f64,
}

/// Outbound `order.seckill.release`: published instead of the usual
/// inventory-release compensation when a seckill-sourced order's
/// payment fails, so the flash-sale engine can credit the winner's
/// reservation back to stock.
#[derive(Debug, Serialize)]
pub struct OrderSeckillReleasePayload {
    pub product_id: String,
    pub user_id: String,
}
