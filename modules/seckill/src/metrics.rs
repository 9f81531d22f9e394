use lazy_static::lazy_static;
use prometheus::{register_int_counter, IntCounter};

lazy_static! {
    /// Incremented whenever a successful reservation's `seckill.order.won`
    /// publish fails and falls back to the ghost-order journal.
    pub static ref SECKILL_PUBLISH_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "seckill_publish_failures_total",
        "Number of seckill.order.won publishes that failed and fell back to the ghost-order journal"
    )
    .expect("seckill_publish_failures_total metric registration");
}
