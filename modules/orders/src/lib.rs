pub mod config;
pub mod consumer_task;
pub mod fsm;
pub mod handlers;
pub mod http;
pub mod models;

pub use config::Config;
pub use consumer_task::start_saga_consumers;
pub use fsm::{next_status, SagaEvent};
pub use handlers::{create_order, get_order, handle_seckill_order_won, OrderError};
pub use models::{CreateOrderRequest, OrderStatus, OrderView};
