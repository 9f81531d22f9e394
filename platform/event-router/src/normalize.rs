use serde_json::Value;
use uuid::Uuid;

/// Errors from normalising a wire-shaped envelope into [`NormalizedEnvelope`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// An envelope after reconciling the handful of historically-different
/// wire shapes producers have emitted: `source_module`/`producer`,
/// `source_version`/`schema_version`, `correlation_id`/`trace_id`, and
/// `payload`/`data` are each accepted as aliases for the other.
#[derive(Debug, Clone)]
pub struct NormalizedEnvelope {
    pub event_id: Uuid,
    pub occurred_at: chrono::DateTime<chrono::Utc>,
    pub source_module: String,
    pub source_version: String,
    pub correlation_id: Option<String>,
    pub causation_id: Option<String>,
    pub payload: Value,
}

/// Normalise a raw JSON envelope, accepting either the canonical
/// wrapped shape (`event_id`/`source_module`/`payload`, ...) or the
/// legacy flat aliases (`producer`, `schema_version`, `trace_id`,
/// `data`).
pub fn normalize_envelope(raw: &Value) -> Result<NormalizedEnvelope, NormalizeError> {
    let event_id_str = raw
        .get("event_id")
        .and_then(Value::as_str)
        .ok_or(NormalizeError::MissingField("event_id"))?;
    let event_id = Uuid::parse_str(event_id_str).map_err(|_| NormalizeError::InvalidField {
        field: "event_id",
        reason: format!("must be a valid UUID, got '{event_id_str}'"),
    })?;

    let occurred_at_str = raw
        .get("occurred_at")
        .and_then(Value::as_str)
        .ok_or(NormalizeError::MissingField("occurred_at"))?;
    let occurred_at = chrono::DateTime::parse_from_rfc3339(occurred_at_str)
        .map_err(|_| NormalizeError::InvalidField {
            field: "occurred_at",
            reason: format!("must be an ISO 8601 timestamp, got '{occurred_at_str}'"),
        })?
        .with_timezone(&chrono::Utc);

    let source_module = raw
        .get("source_module")
        .or_else(|| raw.get("producer"))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or(NormalizeError::MissingField("source_module"))?
        .to_string();

    let source_version = raw
        .get("source_version")
        .or_else(|| raw.get("schema_version"))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or(NormalizeError::MissingField("source_version"))?
        .to_string();

    let correlation_id = raw
        .get("correlation_id")
        .or_else(|| raw.get("trace_id"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let causation_id = raw.get("causation_id").and_then(Value::as_str).map(str::to_string);

    let payload = raw
        .get("payload")
        .or_else(|| raw.get("data"))
        .ok_or(NormalizeError::MissingField("payload"))?;

    if !payload.is_object() {
        return Err(NormalizeError::InvalidField {
            field: "payload",
            reason: "must be an object".to_string(),
        });
    }

    Ok(NormalizedEnvelope {
        event_id,
        occurred_at,
        source_module,
        source_version,
        correlation_id,
        causation_id,
        payload: payload.clone(),
    })
}

/// Coerce a Mongo-style `{ "$oid": "..." }` value (or a plain string)
/// into a bare string identifier. Some upstream producers still emit
/// ObjectId-shaped references for legacy entity IDs.
pub fn coerce_object_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("$oid").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Clamp a legacy numeric stock field (`initialStock`/`available`) into
/// `0..=i32::MAX`. Some older producers sent signed deltas or sentinel
/// negative values meaning "unknown"; neither makes sense as a stock
/// level downstream.
pub fn clamp_stock_quantity(value: &Value) -> i32 {
    value.as_i64().unwrap_or(0).clamp(0, i32::MAX as i64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_canonical_wrapped_shape() {
        let raw = json!({
            "event_id": "550e8400-e29b-41d4-a716-446655440000",
            "occurred_at": "2026-02-12T00:00:00Z",
            "source_module": "orders",
            "source_version": "1.0.0",
            "payload": { "orderId": "order-1" }
        });
        let env = normalize_envelope(&raw).unwrap();
        assert_eq!(env.source_module, "orders");
        assert_eq!(env.payload["orderId"], "order-1");
    }

    #[test]
    fn accepts_legacy_flat_aliases() {
        let raw = json!({
            "event_id": "550e8400-e29b-41d4-a716-446655440000",
            "occurred_at": "2026-02-12T00:00:00Z",
            "producer": "orders-legacy",
            "schema_version": "0.9.0",
            "trace_id": "trace-1",
            "data": { "orderId": "order-1" }
        });
        let env = normalize_envelope(&raw).unwrap();
        assert_eq!(env.source_module, "orders-legacy");
        assert_eq!(env.correlation_id.as_deref(), Some("trace-1"));
        assert_eq!(env.payload["orderId"], "order-1");
    }

    #[test]
    fn rejects_missing_event_id() {
        let raw = json!({ "occurred_at": "2026-02-12T00:00:00Z", "source_module": "orders", "payload": {} });
        assert_eq!(normalize_envelope(&raw), Err(NormalizeError::MissingField("event_id")));
    }

    #[test]
    fn rejects_non_object_payload() {
        let raw = json!({
            "event_id": "550e8400-e29b-41d4-a716-446655440000",
            "occurred_at": "2026-02-12T00:00:00Z",
            "source_module": "orders",
            "source_version": "1.0.0",
            "payload": "not-an-object"
        });
        assert!(normalize_envelope(&raw).is_err());
    }

    #[test]
    fn coerces_object_id_shape() {
        assert_eq!(coerce_object_id(&json!({ "$oid": "abc123" })), Some("abc123".to_string()));
        assert_eq!(coerce_object_id(&json!("abc123")), Some("abc123".to_string()));
        assert_eq!(coerce_object_id(&json!(42)), None);
    }

    #[test]
    fn clamps_negative_stock_to_zero() {
        assert_eq!(clamp_stock_quantity(&json!(-5)), 0);
        assert_eq!(clamp_stock_quantity(&json!(10)), 10);
    }
}
