// fulfillment/src/models/order.rs

use serde::{Deserialize, Serialize};

/// A decoded order message. Lives only for the duration of one message's processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
  #[serde(rename = "OrderId")]
  pub order_id: String,
  #[serde(rename = "Items")]
  pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
  #[serde(rename = "ProductId")]
  pub product_id: String,
  #[serde(rename = "Quantity")]
  pub quantity: u32,
}

impl Order {
  pub fn new(order_id: impl Into<String>) -> Self {
    Self {
      order_id: order_id.into(),
      items: Vec::new(),
    }
  }

  pub fn with_item(mut self, product_id: impl Into<String>, quantity: u32) -> Self {
    self.items.push(OrderItem {
      product_id: product_id.into(),
      quantity,
    });
    self
  }
}
