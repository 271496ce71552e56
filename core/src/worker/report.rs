// fulfillment/src/worker/report.rs

use crate::error::DecodeError;
use crate::reconciler::ReconcileReport;

/// Why a message was left on the queue for redelivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetainReason {
  MalformedPayload(DecodeError),
  /// At least one item was not applied. Applied items are not rolled back.
  Incomplete(ReconcileReport),
}

/// What happened to one leased message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageDisposition {
  /// Every item applied and the message was acknowledged.
  Completed { report: ReconcileReport },
  /// Left leased; it reappears once the lease expires.
  Retained(RetainReason),
  /// Moved to the dead-letter queue without being processed.
  DeadLettered { dead_letter_queue: String },
  /// An infrastructure error interrupted processing; the message is left leased.
  Failed { error: String },
  /// Handed back unprocessed because the worker is stopping.
  Released,
}

impl MessageDisposition {
  pub fn is_completed(&self) -> bool {
    matches!(self, MessageDisposition::Completed { .. })
  }
}

/// Tally of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
  pub fetched: usize,
  pub completed: usize,
  pub retained: usize,
  pub dead_lettered: usize,
  pub failed: usize,
  pub released: usize,
  /// The dequeue itself failed; nothing was fetched.
  pub fetch_failed: bool,
}

impl CycleReport {
  pub fn record(&mut self, disposition: &MessageDisposition) {
    match disposition {
      MessageDisposition::Completed { .. } => self.completed += 1,
      MessageDisposition::Retained(_) => self.retained += 1,
      MessageDisposition::DeadLettered { .. } => self.dead_lettered += 1,
      MessageDisposition::Failed { .. } => self.failed += 1,
      MessageDisposition::Released => self.released += 1,
    }
  }
}
