//! # Transactional Outbox
//!
//! Exactly-once-effect publication of domain events: a business state
//! change and the event announcing it commit in the same database
//! transaction, and a separate relay process is responsible for
//! getting that event onto the broker, at least once, even across
//! process restarts and broker outages.
//!
//! Mirrors the shape of `modules/payments`'s own outbox table, lifted
//! out into a shared crate so every module gets the same claim/retry/
//! backoff machinery instead of reimplementing it per module.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use outbox::{NewOutboxEvent, OutboxManager, OutboxMetadata, Relay};
//! use event_bus::EventBus;
//! use sqlx::PgPool;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use uuid::Uuid;
//!
//! # async fn example(pool: PgPool, bus: Arc<dyn EventBus>) -> Result<(), Box<dyn std::error::Error>> {
//! let manager = OutboxManager::new("orders_events_outbox");
//! let mut tx = pool.begin().await?;
//! // ... update business rows on `tx` ...
//! manager.create_event(&mut tx, NewOutboxEvent {
//!     event_id: Uuid::new_v4(),
//!     aggregate_id: "order-1".into(),
//!     aggregate_type: "order".into(),
//!     event_type: "order.created".into(),
//!     payload: serde_json::json!({ "orderId": "order-1" }),
//!     routing_key: "order.created".into(),
//!     metadata: OutboxMetadata { correlation_id: None, causation_id: None, service: "orders".into() },
//!     max_retries: 5,
//! }).await?;
//! tx.commit().await?;
//!
//! let relay = Relay::new(pool, bus, "orders_events_outbox");
//! relay.run(Duration::from_millis(500)).await;
//! # Ok(())
//! # }
//! ```

mod manager;
mod metrics;
mod model;
mod relay;

pub use manager::{OutboxManager, OUTBOX_TABLE_TEMPLATE};
pub use model::{NewOutboxEvent, OutboxMetadata, OutboxRow, OutboxStatus};
pub use relay::{Relay, RelayError};
