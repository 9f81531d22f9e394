//! # Event Router & Schema Layer
//!
//! Normalises the handful of wire shapes producers have historically
//! emitted (wrapped vs. flat envelopes, `producer`/`source_module`,
//! `schema_version`/`source_version`, `trace_id`/`correlation_id`
//! aliasing) and dispatches a message to the handler registered for
//! its resolved event type, generalising
//! `modules/payments`'s `envelope_validation.rs` and per-subject
//! `consumer_task.rs` subscriptions into something any module can
//! reuse for a single wildcard subscription carrying several event
//! types.

mod dlq;
mod normalize;
mod router;

pub use dlq::{handle_processing_error, insert_failed_event, FAILED_EVENTS_TABLE_TEMPLATE};
pub use normalize::{clamp_stock_quantity, coerce_object_id, normalize_envelope, NormalizeError, NormalizedEnvelope};
pub use router::{Router, RouterError};
