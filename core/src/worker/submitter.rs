// fulfillment/src/worker/submitter.rs

use crate::codec::encode_order;
use crate::error::{DecodeError, FulfillmentResult};
use crate::models::Order;
use crate::queue::Queue;
use std::sync::Arc;
use tracing::{info, instrument};

/// Producer side of the order queue.
#[derive(Clone)]
pub struct OrderSubmitter {
  queue: Arc<dyn Queue>,
  queue_name: String,
}

impl OrderSubmitter {
  pub fn new(queue: Arc<dyn Queue>, queue_name: impl Into<String>) -> Self {
    Self {
      queue,
      queue_name: queue_name.into(),
    }
  }

  /// Encodes `order` in the wire format and enqueues it. Returns the message id.
  ///
  /// Orders the worker could never decode are refused here instead of being queued.
  #[instrument(name = "OrderSubmitter::submit", skip_all, fields(order_id = %order.order_id), err(Display))]
  pub async fn submit(&self, order: &Order) -> FulfillmentResult<String> {
    if let Some(item) = order.items.iter().find(|item| item.quantity == 0) {
      return Err(
        DecodeError::MalformedPayload {
          reason: format!("item '{}' has a non-positive quantity", item.product_id),
        }
        .into(),
      );
    }

    let body = encode_order(order)?;
    let message_id = self.submit_raw(&body).await?;
    info!(%message_id, items = order.items.len(), "Order submitted.");
    Ok(message_id)
  }

  /// Enqueues `body` as-is.
  pub async fn submit_raw(&self, body: &str) -> FulfillmentResult<String> {
    Ok(self.queue.enqueue(&self.queue_name, body).await?)
  }
}
