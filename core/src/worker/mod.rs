// fulfillment/src/worker/mod.rs

//! The order worker: a scheduled poll loop that leases order messages, runs each one
//! through the order pipeline and deletes it only when every item was applied.

pub mod order_pipeline;
pub mod processor;
pub mod provision;
pub mod report;
pub mod scheduler;
pub mod submitter;

pub use order_pipeline::{build_order_pipeline, OrderMessageCtx, OrderPipeline};
pub use processor::OrderProcessor;
pub use provision::provision;
pub use report::{CycleReport, MessageDisposition, RetainReason};
pub use scheduler::{manual_ticker, IntervalTicker, ManualTicker, ManualTrigger, ScheduledTask, TaskProgress, Ticker};
pub use submitter::OrderSubmitter;

use crate::config::WorkerConfig;
use crate::error::FulfillmentResult;
use crate::queue::{Queue, QueueMessage};
use crate::reconciler::InventoryReconciler;
use crate::store::EntityStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

pub struct OrderWorker {
  queue: Arc<dyn Queue>,
  processor: OrderProcessor,
  queue_name: String,
  batch_size: usize,
  lease_duration: Duration,
  poll_interval: Duration,
}

impl OrderWorker {
  pub fn new(store: Arc<dyn EntityStore>, queue: Arc<dyn Queue>, config: &WorkerConfig) -> FulfillmentResult<Self> {
    config.validate()?;
    let reconciler = InventoryReconciler::new(store, config.concurrency_mode);
    let processor = OrderProcessor::new(queue.clone(), config.queue_name.clone(), reconciler, &config.dead_letter);

    Ok(Self {
      queue,
      processor,
      queue_name: config.queue_name.clone(),
      batch_size: config.batch_size,
      lease_duration: config.lease_duration,
      poll_interval: config.poll_interval,
    })
  }

  pub fn queue_name(&self) -> &str {
    &self.queue_name
  }

  /// One poll cycle: lease up to `batch_size` messages and process them in order.
  ///
  /// Never fails. A failed dequeue yields an empty report with `fetch_failed` set; a
  /// failing message is recorded and the rest of the batch continues.
  pub async fn run_cycle(&self) -> CycleReport {
    self.run_cycle_until(&AtomicBool::new(false)).await
  }

  /// `run_cycle`, releasing the messages not yet started once `stopping` is set.
  #[instrument(name = "OrderWorker::run_cycle", skip_all, fields(queue = %self.queue_name))]
  async fn run_cycle_until(&self, stopping: &AtomicBool) -> CycleReport {
    let mut report = CycleReport::default();

    let messages = match self.queue.dequeue(&self.queue_name, self.batch_size, self.lease_duration).await {
      Ok(messages) => messages,
      Err(e) => {
        error!(error = %e, "Failed to fetch order messages.");
        report.fetch_failed = true;
        return report;
      }
    };
    report.fetched = messages.len();

    let mut pending = messages.into_iter();
    while let Some(message) = pending.next() {
      if stopping.load(Ordering::SeqCst) {
        self.release_all(std::iter::once(message).chain(pending), &mut report).await;
        break;
      }
      let disposition = self.processor.process(message).await;
      report.record(&disposition);
    }

    if report.fetched > 0 {
      info!(
        fetched = report.fetched,
        completed = report.completed,
        retained = report.retained,
        dead_lettered = report.dead_lettered,
        failed = report.failed,
        released = report.released,
        "Poll cycle finished."
      );
    }
    report
  }

  async fn release_all(&self, messages: impl Iterator<Item = QueueMessage>, report: &mut CycleReport) {
    for message in messages {
      match self
        .queue
        .release(&self.queue_name, &message.message_id, &message.receipt_handle)
        .await
      {
        Ok(()) => report.record(&MessageDisposition::Released),
        Err(e) => {
          warn!(message_id = %message.message_id, error = %e, "Release failed; the message reappears when its lease expires.");
          report.record(&MessageDisposition::Failed { error: e.to_string() });
        }
      }
    }
  }

  /// Arms a scheduled poll loop driven by `ticker` and returns immediately.
  ///
  /// Each tick spawns `run_cycle` as its own task; cycle reports are published on the
  /// handle. Each handle has its own stop flag, so stopping one leaves any other
  /// handle on the same worker running normally. Must be called within a tokio runtime.
  pub fn start<T: Ticker>(self: &Arc<Self>, ticker: T) -> WorkerHandle {
    let stopping = Arc::new(AtomicBool::new(false));
    let (reports_tx, reports_rx) = watch::channel(None);
    let reports_tx = Arc::new(reports_tx);

    let worker = self.clone();
    let cycle_stopping = stopping.clone();
    let task = ScheduledTask::start(format!("order-worker:{}", self.queue_name), ticker, move || {
      let worker = worker.clone();
      let stopping = cycle_stopping.clone();
      let reports_tx = reports_tx.clone();
      async move {
        let report = worker.run_cycle_until(&stopping).await;
        reports_tx.send_replace(Some(report));
      }
    });

    info!(queue = %self.queue_name, "Order worker started.");
    WorkerHandle {
      task,
      stopping,
      reports: reports_rx,
    }
  }

  /// `start` on the configured poll interval.
  pub fn start_with_interval(self: &Arc<Self>) -> WorkerHandle {
    self.start(IntervalTicker::new(self.poll_interval))
  }
}

/// Owner of a running worker. Dropping it disarms the trigger; cycles in flight still
/// run to completion.
#[derive(Debug)]
pub struct WorkerHandle {
  task: ScheduledTask,
  stopping: Arc<AtomicBool>,
  reports: watch::Receiver<Option<CycleReport>>,
}

impl WorkerHandle {
  /// Disarms the trigger and asks in-flight cycles to release their unstarted messages.
  pub fn stop(&self) {
    self.stopping.store(true, Ordering::SeqCst);
    self.task.stop();
  }

  pub fn is_stopped(&self) -> bool {
    self.task.is_stopped()
  }

  /// Latest finished cycle report, updated as cycles complete.
  pub fn reports(&self) -> watch::Receiver<Option<CycleReport>> {
    self.reports.clone()
  }

  pub fn progress(&self) -> watch::Receiver<TaskProgress> {
    self.task.progress()
  }

  /// `stop`, then wait until every in-flight cycle has finished.
  pub async fn shutdown(mut self) {
    self.stop();
    self.task.shutdown().await;
    info!(task = %self.task.name(), "Order worker stopped.");
  }
}
