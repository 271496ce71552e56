// fulfillment/src/queue/mod.rs

//! The lease-based message queue contract consumed by the order worker.
//!
//! A dequeue hands out a message together with a fresh `ReceiptHandle` and hides the
//! message until its lease expires. Only the holder of the current receipt may delete
//! or release the message; once the lease lapses and another consumer dequeues it,
//! older receipts become stale. This is what gives the worker at-least-once delivery:
//! a message that is never deleted simply reappears.

pub mod memory;

use crate::error::QueueError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

pub use memory::InMemoryQueue;

/// Opaque token proving ownership of one lease on one message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
  pub fn new(value: impl Into<String>) -> Self {
    Self(value.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for ReceiptHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// One leased delivery of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
  pub message_id: String,
  pub receipt_handle: ReceiptHandle,
  pub body: String,
  /// Number of times the message has been dequeued, including this delivery.
  pub dequeue_count: u32,
  pub inserted_at: DateTime<Utc>,
  /// End of the current lease.
  pub visible_after: DateTime<Utc>,
}

#[async_trait]
pub trait Queue: Send + Sync + 'static {
  async fn create_if_not_exists(&self, queue: &str) -> Result<(), QueueError>;

  /// Appends `payload` and returns the new message id. Ordering is best-effort FIFO.
  async fn enqueue(&self, queue: &str, payload: &str) -> Result<String, QueueError>;

  /// Leases up to `max_messages` currently visible messages for `lease`.
  ///
  /// Concurrent callers never receive the same message while its lease is live.
  async fn dequeue(&self, queue: &str, max_messages: usize, lease: Duration) -> Result<Vec<QueueMessage>, QueueError>;

  /// Removes a leased message. Fails with `StaleReceipt` when `receipt` is not the
  /// message's current receipt, including when the message is already gone.
  async fn delete(&self, queue: &str, message_id: &str, receipt: &ReceiptHandle) -> Result<(), QueueError>;

  /// Ends the lease early so the message is visible again immediately.
  async fn release(&self, queue: &str, message_id: &str, receipt: &ReceiptHandle) -> Result<(), QueueError>;

  /// Number of messages in the queue, leased or not.
  async fn approximate_len(&self, queue: &str) -> Result<usize, QueueError>;
}
