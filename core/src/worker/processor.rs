// fulfillment/src/worker/processor.rs

use super::order_pipeline::{build_order_pipeline, OrderMessageCtx, OrderPipeline};
use super::report::MessageDisposition;
use crate::config::DeadLetterPolicy;
use crate::pipeline::{ContextData, PipelineResult};
use crate::queue::{Queue, QueueMessage};
use crate::reconciler::InventoryReconciler;
use std::sync::Arc;
use tracing::{error, instrument};

/// Runs one leased message through the order pipeline and turns whatever happens into
/// a `MessageDisposition`. Never fails: errors are logged and reported as `Failed`.
#[derive(Clone)]
pub struct OrderProcessor {
  queue_name: String,
  pipeline: Arc<OrderPipeline>,
}

impl OrderProcessor {
  pub fn new(
    queue: Arc<dyn Queue>,
    queue_name: impl Into<String>,
    reconciler: InventoryReconciler,
    dead_letter: &DeadLetterPolicy,
  ) -> Self {
    Self {
      queue_name: queue_name.into(),
      pipeline: Arc::new(build_order_pipeline(queue, reconciler, dead_letter)),
    }
  }

  #[instrument(
    name = "OrderProcessor::process",
    skip_all,
    fields(message_id = %message.message_id, dequeue_count = message.dequeue_count)
  )]
  pub async fn process(&self, message: QueueMessage) -> MessageDisposition {
    let ctx_data = ContextData::new(OrderMessageCtx::new(self.queue_name.clone(), message));

    let outcome = self.pipeline.run(ctx_data.clone()).await;
    let disposition = ctx_data.write().disposition.take();

    match (outcome, disposition) {
      (Ok(_), Some(disposition)) => disposition,
      (Ok(result), None) => {
        let reason = match result {
          PipelineResult::Completed => "pipeline completed without recording a disposition".to_string(),
          PipelineResult::Stopped { step_name } => format!("pipeline stopped at '{}' without a disposition", step_name),
        };
        error!(%reason, "Order pipeline misbehaved.");
        MessageDisposition::Failed { error: reason }
      }
      (Err(e), _) => {
        error!(error = %e, "Message processing failed; it will be redelivered after its lease expires.");
        MessageDisposition::Failed { error: e.to_string() }
      }
    }
  }
}
