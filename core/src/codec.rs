// fulfillment/src/codec.rs

//! Wire format for order messages:
//! `{ "OrderId": string, "Items": [ { "ProductId": string, "Quantity": integer } ] }`.

use crate::error::{DecodeError, FulfillmentError, FulfillmentResult};
use crate::models::Order;

/// Decodes a queue message body into an `Order`.
///
/// Any syntax error, missing field, wrongly typed field, or non-positive quantity
/// yields `DecodeError::MalformedPayload`. Decoding has no side effects.
pub fn decode_order(raw: &str) -> Result<Order, DecodeError> {
  let order: Order = serde_json::from_str(raw).map_err(|e| DecodeError::MalformedPayload { reason: e.to_string() })?;

  if let Some((idx, item)) = order.items.iter().enumerate().find(|(_, item)| item.quantity == 0) {
    return Err(DecodeError::MalformedPayload {
      reason: format!("item {} ('{}') has a non-positive quantity", idx, item.product_id),
    });
  }

  Ok(order)
}

pub fn encode_order(order: &Order) -> FulfillmentResult<String> {
  serde_json::to_string(order).map_err(|e| FulfillmentError::Internal(format!("order encoding failed: {}", e)))
}
