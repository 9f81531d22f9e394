pub mod catalog;
pub mod config;
pub mod consumer_task;
pub mod engine;
pub mod models;

pub use config::Config;
pub use consumer_task::start_inventory_consumers;
pub use engine::{release, reserve_batch};
pub use models::{ReserveError, ReserveOutcome};
