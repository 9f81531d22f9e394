pub mod config;
pub mod consumer_task;
pub mod handlers;
pub mod models;
pub mod processor;

pub use config::Config;
pub use consumer_task::start_order_confirmed_consumer;
pub use handlers::handle_order_confirmed;
pub use models::{FailureCode, OrderConfirmedPayload, PaymentFailedPayload, PaymentSucceededPayload};
pub use processor::MockPaymentProcessor;
