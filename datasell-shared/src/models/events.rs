use serde::{Deserialize, Serialize};

use super::order::Order;

/// Change notification published by a store after a successful write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "order", rename_all = "snake_case")]
pub enum OrderEvent {
    Created(Order),
    Updated(Order),
}

impl OrderEvent {
    pub fn order(&self) -> &Order {
        match self {
            OrderEvent::Created(order) | OrderEvent::Updated(order) => order,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            OrderEvent::Created(order) | OrderEvent::Updated(order) => order,
        }
    }
}
