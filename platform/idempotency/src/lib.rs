//! # Idempotency
//!
//! Two layers of duplicate suppression for at-least-once delivery:
//!
//! - [`MemoryIdempotency`]: fast in-memory key store with TTL, used as
//!   the hot path in front of every consumer. Fails open on internal
//!   error (never blocks legitimate events) — the outbox's unique
//!   `event_id` constraint is the backstop if this layer ever lets a
//!   duplicate through.
//! - [`DurableIdempotency`]: a Postgres-backed processed-message table,
//!   used where a process restart must not forget what it already
//!   handled. Write-through after successful handling.
//!
//! Key format for both layers: `<service>:event:processed:<eventType>:<id>`.

mod durable;
mod memory;

pub use durable::DurableIdempotency;
pub use memory::MemoryIdempotency;

/// Build the canonical idempotency key.
pub fn processed_key(service: &str, event_type: &str, id: &str) -> String {
    format!("{service}:event:processed:{event_type}:{id}")
}
