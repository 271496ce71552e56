// fulfillment/src/worker/scheduler.rs

//! A periodic trigger that spawns one detached cycle per tick.
//!
//! Cycles are not serialized: a slow cycle does not delay the next tick, so cycles may
//! overlap. Stopping disarms the trigger only; cycles already running finish on their own.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn, Instrument};

/// Source of scheduler ticks.
#[async_trait]
pub trait Ticker: Send + 'static {
  /// Waits for the next tick. `false` means the source is exhausted and the task ends.
  ///
  /// Must be cancel-safe: the scheduler drops a pending `tick` when it is stopped.
  async fn tick(&mut self) -> bool;
}

/// Production ticker on tokio's monotonic clock. The first tick fires immediately.
#[derive(Debug)]
pub struct IntervalTicker {
  interval: Interval,
}

impl IntervalTicker {
  pub fn new(period: Duration) -> Self {
    let mut interval = interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    Self { interval }
  }
}

#[async_trait]
impl Ticker for IntervalTicker {
  async fn tick(&mut self) -> bool {
    self.interval.tick().await;
    true
  }
}

/// Ticks on demand through its paired `ManualTrigger`.
#[derive(Debug)]
pub struct ManualTicker {
  rx: mpsc::UnboundedReceiver<()>,
}

#[derive(Debug, Clone)]
pub struct ManualTrigger {
  tx: mpsc::UnboundedSender<()>,
}

impl ManualTrigger {
  /// Returns `false` once the ticker is gone.
  pub fn fire(&self) -> bool {
    self.tx.send(()).is_ok()
  }
}

pub fn manual_ticker() -> (ManualTrigger, ManualTicker) {
  let (tx, rx) = mpsc::unbounded_channel();
  (ManualTrigger { tx }, ManualTicker { rx })
}

#[async_trait]
impl Ticker for ManualTicker {
  async fn tick(&mut self) -> bool {
    self.rx.recv().await.is_some()
  }
}

/// Cycle bookkeeping published by a `ScheduledTask`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskProgress {
  pub started: u64,
  pub finished: u64,
}

impl TaskProgress {
  pub fn in_flight(&self) -> u64 {
    self.started - self.finished
  }
}

/// Marks one cycle as finished when dropped, including when the cycle panics.
struct CycleGuard(Arc<watch::Sender<TaskProgress>>);

impl CycleGuard {
  fn begin(progress: &Arc<watch::Sender<TaskProgress>>) -> Self {
    progress.send_modify(|p| p.started += 1);
    Self(progress.clone())
  }
}

impl Drop for CycleGuard {
  fn drop(&mut self) {
    self.0.send_modify(|p| p.finished += 1);
  }
}

/// An armed periodic trigger. Dropping it disarms the trigger.
#[derive(Debug)]
pub struct ScheduledTask {
  name: String,
  stop_tx: watch::Sender<bool>,
  progress: Arc<watch::Sender<TaskProgress>>,
  trigger_loop: Option<JoinHandle<()>>,
}

impl ScheduledTask {
  /// Arms the trigger and returns immediately. Must be called within a tokio runtime.
  pub fn start<T, F, Fut>(name: impl Into<String>, mut ticker: T, cycle: F) -> Self
  where
    T: Ticker,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    let name = name.into();
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let progress = Arc::new(watch::channel(TaskProgress::default()).0);

    let loop_progress = progress.clone();
    let span = tracing::info_span!("scheduled_task", task = %name);
    let trigger_loop = tokio::spawn(
      async move {
        info!("Trigger armed.");
        loop {
          tokio::select! {
            biased;
            // Err means every sender is gone, which is a stop as well.
            _ = stop_rx.changed() => break,
            fired = ticker.tick() => {
              if !fired {
                debug!("Tick source exhausted.");
                break;
              }
              if *stop_rx.borrow() {
                break;
              }
              let guard = CycleGuard::begin(&loop_progress);
              let fut = cycle();
              tokio::spawn(async move {
                let _guard = guard;
                fut.await;
              }.in_current_span());
            }
          }
        }
        info!("Trigger disarmed.");
      }
      .instrument(span),
    );

    Self {
      name,
      stop_tx,
      progress,
      trigger_loop: Some(trigger_loop),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Disarms the trigger. Idempotent; running cycles are not interrupted.
  pub fn stop(&self) {
    self.stop_tx.send_replace(true);
  }

  pub fn is_stopped(&self) -> bool {
    *self.stop_tx.borrow()
  }

  pub fn progress(&self) -> watch::Receiver<TaskProgress> {
    self.progress.subscribe()
  }

  /// Disarms the trigger, then waits for the trigger loop and every in-flight cycle.
  pub async fn shutdown(&mut self) {
    self.stop();
    if let Some(trigger_loop) = self.trigger_loop.take() {
      if let Err(e) = trigger_loop.await {
        warn!(task = %self.name, error = %e, "Trigger loop ended abnormally.");
      }
    }
    let mut progress = self.progress.subscribe();
    // The sender lives in `self`, so this only ends when the count drains.
    let _ = progress.wait_for(|p| p.in_flight() == 0).await;
  }
}

impl Drop for ScheduledTask {
  fn drop(&mut self) {
    self.stop();
  }
}
