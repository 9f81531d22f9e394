use serde::{Deserialize, Serialize};

/// Incoming payload carried on `order.confirmed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderConfirmedPayload {
    pub order_id: String,
    pub products: Vec<OrderLineItem>,
    pub total_price: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub product_id: String,
    pub quantity: i32,
    pub unit_price: f64,
}

/// Outgoing payload for `payment.succeeded`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSucceededPayload {
    pub order_id: String,
    pub amount: f64,
    pub currency: String,
    pub transaction_id: String,
}

/// Outgoing payload for `payment.failed`. Carries the original product
/// list back so the inventory module can release the reservation it
/// made for this order without re-querying it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentFailedPayload {
    pub order_id: String,
    pub products: Vec<OrderLineItem>,
    pub reason: String,
    pub failure_code: FailureCode,
}

/// Classification of a processor failure: `Transient` failures are
/// worth retrying (the gateway or network hiccuped), `Terminal`
/// failures will never succeed on retry (the card was declined).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    GatewayTimeout,
    NetworkError,
    ServiceUnavailable,
    RateLimited,
    PaymentDeclined,
}

impl FailureCode {
    pub fn is_transient(&self) -> bool {
        !matches!(self, FailureCode::PaymentDeclined)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCode::GatewayTimeout => "GATEWAY_TIMEOUT",
            FailureCode::NetworkError => "NETWORK_ERROR",
            FailureCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            FailureCode::RateLimited => "RATE_LIMITED",
            FailureCode::PaymentDeclined => "PAYMENT_DECLINED",
        }
    }
}

/// Result returned by the processor for one attempt.
#[derive(Debug, Clone)]
pub enum ProcessorOutcome {
    Succeeded { transaction_id: String },
    Failed { code: FailureCode, message: String },
}

/// Persisted row: at most one per `order_id`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PaymentRow {
    pub order_id: String,
    pub status: String,
    pub amount: f64,
    pub currency: String,
    pub transaction_id: Option<String>,
    pub gateway_response: Option<String>,
    pub reason: Option<String>,
    pub attempts: i32,
    pub error_history: serde_json::Value,
    pub processed_at: Option<chrono::NaiveDateTime>,
    pub correlation_id: Option<String>,
}
