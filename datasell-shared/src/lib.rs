pub mod models;
pub mod pii;

pub use models::{AdminStats, Order, OrderDraft, OrderEvent, OrderPatch, OrderStatus};
pub use pii::Masked;
