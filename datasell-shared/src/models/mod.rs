pub mod events;
pub mod order;
pub mod stats;

pub use events::OrderEvent;
pub use order::{Order, OrderDraft, OrderPatch, OrderStatus};
pub use stats::AdminStats;
