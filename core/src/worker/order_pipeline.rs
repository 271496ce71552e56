// fulfillment/src/worker/order_pipeline.rs

//! The per-message pipeline: dead-letter screening, decode, reconcile, acknowledge.
//!
//! Every handler records the message's fate in `OrderMessageCtx::disposition` before it
//! stops the run; only infrastructure errors escape as `Err`.

use super::report::{MessageDisposition, RetainReason};
use crate::codec::decode_order;
use crate::config::DeadLetterPolicy;
use crate::error::{FulfillmentError, QueueError};
use crate::models::Order;
use crate::pipeline::{ContextData, Pipeline, PipelineControl, SkipCondition};
use crate::queue::{Queue, QueueMessage};
use crate::reconciler::{InventoryReconciler, ReconcileReport};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const STEP_SCREEN_DEAD_LETTER: &str = "screen_dead_letter";
pub const STEP_DECODE_ORDER: &str = "decode_order";
pub const STEP_RECONCILE_INVENTORY: &str = "reconcile_inventory";
pub const STEP_ACKNOWLEDGE_MESSAGE: &str = "acknowledge_message";

#[derive(Debug, Clone)]
pub struct OrderMessageCtx {
  pub queue_name: String,
  pub message: QueueMessage,
  pub order: Option<Order>,
  pub report: Option<ReconcileReport>,
  pub disposition: Option<MessageDisposition>,
}

impl OrderMessageCtx {
  pub fn new(queue_name: impl Into<String>, message: QueueMessage) -> Self {
    Self {
      queue_name: queue_name.into(),
      message,
      order: None,
      report: None,
      disposition: None,
    }
  }
}

pub type OrderPipeline = Pipeline<OrderMessageCtx, FulfillmentError>;

pub fn build_order_pipeline(
  queue: Arc<dyn Queue>,
  reconciler: InventoryReconciler,
  dead_letter: &DeadLetterPolicy,
) -> OrderPipeline {
  let screen_skip: Option<SkipCondition<OrderMessageCtx>> = match dead_letter {
    DeadLetterPolicy::RetryForever => None,
    DeadLetterPolicy::MoveAfter { max_dequeue_count, .. } => {
      let max = *max_dequeue_count;
      Some(Arc::new(move |ctx: ContextData<OrderMessageCtx>| ctx.read().message.dequeue_count <= max))
    }
  };

  let mut p = OrderPipeline::new(&[
    (STEP_SCREEN_DEAD_LETTER, true, screen_skip),
    (STEP_DECODE_ORDER, false, None),
    (STEP_RECONCILE_INVENTORY, false, None),
    (STEP_ACKNOWLEDGE_MESSAGE, false, None),
  ]);

  // Without a dead-letter queue the screening step has no handler and is skipped.
  if let DeadLetterPolicy::MoveAfter { queue_name, .. } = dead_letter {
    let queue = queue.clone();
    let dead_letter_queue = queue_name.clone();
    p.on_root(STEP_SCREEN_DEAD_LETTER, move |ctx_data: ContextData<OrderMessageCtx>| {
      let queue = queue.clone();
      let dead_letter_queue = dead_letter_queue.clone();
      async move {
        let (queue_name, message) = {
          let guard = ctx_data.read();
          (guard.queue_name.clone(), guard.message.clone())
        };

        queue.enqueue(&dead_letter_queue, &message.body).await?;
        match queue.delete(&queue_name, &message.message_id, &message.receipt_handle).await {
          Ok(()) => {}
          Err(QueueError::StaleReceipt { .. }) => {
            warn!(message_id = %message.message_id, "Lease lost while dead-lettering; the message may be dead-lettered again.")
          }
          Err(e) => return Err(e.into()),
        }

        warn!(
          message_id = %message.message_id,
          dequeue_count = message.dequeue_count,
          %dead_letter_queue,
          "Message moved to dead-letter queue."
        );
        ctx_data.write().disposition = Some(MessageDisposition::DeadLettered { dead_letter_queue });
        Ok::<_, FulfillmentError>(PipelineControl::Stop)
      }
    });
  }

  p.on_root(STEP_DECODE_ORDER, |ctx_data: ContextData<OrderMessageCtx>| async move {
    let mut guard = ctx_data.write();
    match decode_order(&guard.message.body) {
      Ok(order) => {
        debug!(message_id = %guard.message.message_id, order_id = %order.order_id, "Order decoded.");
        guard.order = Some(order);
        Ok::<_, FulfillmentError>(PipelineControl::Continue)
      }
      Err(e) => {
        warn!(
          message_id = %guard.message.message_id,
          dequeue_count = guard.message.dequeue_count,
          error = %e,
          "Undecodable message left for redelivery."
        );
        guard.disposition = Some(MessageDisposition::Retained(RetainReason::MalformedPayload(e)));
        Ok(PipelineControl::Stop)
      }
    }
  });

  p.on_root(STEP_RECONCILE_INVENTORY, move |ctx_data: ContextData<OrderMessageCtx>| {
    let reconciler = reconciler.clone();
    async move {
      let order = ctx_data
        .read()
        .order
        .clone()
        .ok_or_else(|| FulfillmentError::Internal("reconcile step reached without a decoded order".to_string()))?;
      let report = reconciler.reconcile(&order).await?;
      ctx_data.write().report = Some(report);
      Ok::<_, FulfillmentError>(PipelineControl::Continue)
    }
  });

  p.after_root(STEP_RECONCILE_INVENTORY, |ctx_data: ContextData<OrderMessageCtx>| async move {
    let mut guard = ctx_data.write();
    let Some(report) = guard.report.clone() else {
      return Err(FulfillmentError::Internal("reconcile step produced no report".to_string()));
    };
    if report.is_fully_applied() {
      return Ok(PipelineControl::Continue);
    }

    warn!(
      message_id = %guard.message.message_id,
      order_id = %report.order_id,
      failed_items = report.failures().count(),
      "Order not fully applied; leaving message for redelivery."
    );
    guard.disposition = Some(MessageDisposition::Retained(RetainReason::Incomplete(report)));
    Ok(PipelineControl::Stop)
  });

  p.on_root(STEP_ACKNOWLEDGE_MESSAGE, move |ctx_data: ContextData<OrderMessageCtx>| {
    let queue = queue.clone();
    async move {
      let (queue_name, message, report) = {
        let guard = ctx_data.read();
        (guard.queue_name.clone(), guard.message.clone(), guard.report.clone())
      };
      let report =
        report.ok_or_else(|| FulfillmentError::Internal("acknowledge step reached without a report".to_string()))?;

      match queue.delete(&queue_name, &message.message_id, &message.receipt_handle).await {
        Ok(()) => info!(message_id = %message.message_id, order_id = %report.order_id, "Order fulfilled."),
        // The stock is already decremented. Another consumer now holds the message and
        // will apply it again; that duplicate is the at-least-once cost.
        Err(QueueError::StaleReceipt { .. }) => warn!(
          message_id = %message.message_id,
          order_id = %report.order_id,
          "Order applied but its lease expired before acknowledgement."
        ),
        Err(e) => return Err(e.into()),
      }

      ctx_data.write().disposition = Some(MessageDisposition::Completed { report });
      Ok::<_, FulfillmentError>(PipelineControl::Continue)
    }
  });

  p
}
