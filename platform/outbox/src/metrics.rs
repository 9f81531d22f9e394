use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, IntCounterVec};

lazy_static! {
    /// Counted by table so one noisy module's outbox doesn't mask
    /// another's in aggregate dashboards.
    pub static ref OUTBOX_PUBLISH_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "outbox_publish_failures_total",
        "Number of outbox rows that failed to publish on a relay attempt",
        &["table", "event_type"]
    )
    .expect("outbox_publish_failures_total metric registration");
    pub static ref OUTBOX_PUBLISHED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "outbox_published_total",
        "Number of outbox rows successfully published",
        &["table", "event_type"]
    )
    .expect("outbox_published_total metric registration");
    pub static ref OUTBOX_DEAD_LETTERED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "outbox_dead_lettered_total",
        "Number of outbox rows that exhausted their retry budget",
        &["table", "event_type"]
    )
    .expect("outbox_dead_lettered_total metric registration");
}
