use serde::Serialize;
use serde_json::Value;

use crate::domain::order::{Order, OrderId, OrderLine};

/// Read-back of the order. Carries no price data.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderSnapshot {
    pub order_id: OrderId,
    #[serde(rename = "items")]
    pub lines: Vec<OrderLine>,
    #[serde(rename = "item_count")]
    pub total_quantity: u32,
}

impl OrderSnapshot {
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FinalizeReceipt {
    pub order_id: OrderId,
    pub finalized: bool,
}

impl FinalizeReceipt {
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

pub fn read_order(order: &Order) -> OrderSnapshot {
    OrderSnapshot {
        order_id: order.id().clone(),
        lines: order.lines(),
        total_quantity: order.total_quantity(),
    }
}

pub fn finalize_order(order: &Order) -> FinalizeReceipt {
    FinalizeReceipt { order_id: order.id().clone(), finalized: true }
}
