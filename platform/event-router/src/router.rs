use crate::normalize::{normalize_envelope, NormalizeError, NormalizedEnvelope};
use event_bus::BusMessage;
use futures::future::BoxFuture;
use std::collections::HashMap;

/// Errors surfaced by [`Router::dispatch`].
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("envelope normalisation failed: {0}")]
    Envelope(#[from] NormalizeError),

    #[error("no handler registered for event type '{0}'")]
    UnknownEventType(String),

    #[error("handler failed: {0}")]
    HandlerFailed(String),

    #[error("message payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

type Handler = Box<dyn Fn(NormalizedEnvelope) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// Dispatches a message received on a (possibly wildcard) subscription
/// to the handler registered for its resolved event type, rather than
/// every module opening a separate subscription per event type.
///
/// Resolution order: an explicit `type` field on the envelope, then a
/// legacy `rawType` field, then finally the subject the message was
/// delivered on (for producers that never started stamping a type
/// field at all and rely purely on the subject hierarchy).
#[derive(Default)]
pub struct Router {
    handlers: HashMap<String, Handler>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for `event_type`. Re-registering the same
    /// type replaces the previous handler.
    pub fn register<F, Fut>(&mut self, event_type: impl Into<String>, handler: F)
    where
        F: Fn(NormalizedEnvelope) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), String>> + Send + 'static,
    {
        self.handlers
            .insert(event_type.into(), Box::new(move |env| Box::pin(handler(env))));
    }

    pub fn resolve_event_type<'a>(raw: &'a serde_json::Value, subject: &'a str) -> &'a str {
        raw.get("type")
            .and_then(serde_json::Value::as_str)
            .or_else(|| raw.get("rawType").and_then(serde_json::Value::as_str))
            .unwrap_or(subject)
    }

    /// Parse `msg`'s payload, normalise its envelope, resolve its event
    /// type, and run the matching handler. Returns
    /// [`RouterError::UnknownEventType`] rather than silently dropping
    /// the message when no handler matches, so callers can route it to
    /// a dead-letter table instead of losing it.
    pub async fn dispatch(&self, msg: &BusMessage) -> Result<(), RouterError> {
        let raw: serde_json::Value = serde_json::from_slice(&msg.payload)?;
        let event_type = Self::resolve_event_type(&raw, &msg.subject).to_string();

        let handler = self
            .handlers
            .get(&event_type)
            .ok_or_else(|| RouterError::UnknownEventType(event_type.clone()))?;

        let envelope = normalize_envelope(&raw)?;
        handler(envelope).await.map_err(RouterError::HandlerFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn message(body: serde_json::Value, subject: &str) -> BusMessage {
        BusMessage::new(subject.to_string(), serde_json::to_vec(&body).unwrap())
    }

    #[tokio::test]
    async fn dispatches_by_explicit_type_field() {
        let mut router = Router::new();
        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();
        router.register("order.created", move |_env| {
            let called = called_clone.clone();
            async move {
                called.store(true, Ordering::SeqCst);
                Ok(())
            }
        });

        let msg = message(
            json!({
                "type": "order.created",
                "event_id": "550e8400-e29b-41d4-a716-446655440000",
                "occurred_at": "2026-02-12T00:00:00Z",
                "source_module": "orders",
                "source_version": "1.0.0",
                "payload": {}
            }),
            "order.events.misc",
        );

        router.dispatch(&msg).await.unwrap();
        assert!(called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn falls_back_to_subject_when_no_type_field() {
        let mut router = Router::new();
        router.register("order.cancelled", |_env| async { Ok(()) });

        let msg = message(
            json!({
                "event_id": "550e8400-e29b-41d4-a716-446655440000",
                "occurred_at": "2026-02-12T00:00:00Z",
                "source_module": "orders",
                "source_version": "1.0.0",
                "payload": {}
            }),
            "order.cancelled",
        );

        assert!(router.dispatch(&msg).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_event_type_is_reported_not_dropped() {
        let router = Router::new();
        let msg = message(
            json!({
                "type": "order.teleported",
                "event_id": "550e8400-e29b-41d4-a716-446655440000",
                "occurred_at": "2026-02-12T00:00:00Z",
                "source_module": "orders",
                "source_version": "1.0.0",
                "payload": {}
            }),
            "order.events.misc",
        );

        let err = router.dispatch(&msg).await.unwrap_err();
        assert!(matches!(err, RouterError::UnknownEventType(t) if t == "order.teleported"));
    }
}
