pub mod state;
pub mod worker;

pub use state::RelayState;
pub use worker::{deliver, start_delivery_worker, DeliveryWorker};
