use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of one outbox row. `PUBLISHING` is an internal lease
/// state the relay uses for its claim step so a second relay instance
/// polling concurrently can't double-publish the same row; it is never
/// a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Pending,
    Publishing,
    Published,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Publishing => "PUBLISHING",
            Self::Published => "PUBLISHED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "PUBLISHING" => Some(Self::Publishing),
            "PUBLISHED" => Some(Self::Published),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Metadata carried on the broker frame alongside the payload:
/// `eventId` is the row's primary idempotency key, `correlationId`/
/// `causationId` link related events, `service` is the producing
/// module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxMetadata {
    pub correlation_id: Option<String>,
    pub causation_id: Option<String>,
    pub service: String,
}

/// A new event to enqueue, supplied by the caller inside its own
/// business transaction.
pub struct NewOutboxEvent {
    /// Idempotency key for the event itself. Callers that need
    /// deterministic IDs (e.g. `payment-succeeded:{orderId}`) pass one
    /// explicitly; otherwise a fresh UUID.
    pub event_id: Uuid,
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub routing_key: String,
    pub metadata: OutboxMetadata,
    pub max_retries: i32,
}

/// A persisted outbox row, as read back by the relay.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OutboxRow {
    pub id: i64,
    pub event_id: Uuid,
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub routing_key: String,
    pub correlation_id: Option<String>,
    pub causation_id: Option<String>,
    pub service: String,
    pub status: String,
    pub retry_count: i32,
    pub max_retries: i32,
    pub last_error: Option<String>,
    pub lease_expires_at: Option<NaiveDateTime>,
    pub next_attempt_at: Option<NaiveDateTime>,
    pub published_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl OutboxRow {
    /// Reassemble the broker frame: payload plus the envelope metadata
    /// the relay publishes alongside it. Field names (`occurred_at`,
    /// `source_module`, `source_version`) match the canonical shape
    /// `event_router::normalize_envelope` expects on the consuming side;
    /// `event_type`/`aggregate_id`/`aggregate_type` ride along for
    /// operator tooling and aren't required by normalisation.
    pub fn to_broker_frame(&self) -> serde_json::Value {
        serde_json::json!({
            "event_id": self.event_id,
            "occurred_at": DateTime::<Utc>::from_naive_utc_and_offset(self.created_at, Utc),
            "source_module": self.service,
            "source_version": "1.0.0",
            "correlation_id": self.correlation_id,
            "causation_id": self.causation_id,
            "event_type": self.event_type,
            "aggregate_id": self.aggregate_id,
            "aggregate_type": self.aggregate_type,
            "payload": self.payload,
        })
    }
}
