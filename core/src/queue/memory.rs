// fulfillment/src/queue/memory.rs

//! In-process lease queue.
//!
//! ## Limitations
//!
//! - No persistence: messages live as long as the value does
//! - Single process only
//! - Lease expiry is evaluated lazily against the injected `Clock` on every call

use super::{Queue, QueueMessage, ReceiptHandle};
use crate::clock::{Clock, SystemClock};
use crate::error::QueueError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{event, Level};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredMessage {
  message_id: String,
  body: String,
  inserted_at: DateTime<Utc>,
  dequeue_count: u32,
  visible_after: DateTime<Utc>,
  receipt: Option<ReceiptHandle>,
}

#[derive(Debug)]
pub struct InMemoryQueue {
  queues: Mutex<HashMap<String, VecDeque<StoredMessage>>>,
  available: AtomicBool,
  clock: Arc<dyn Clock>,
}

impl Default for InMemoryQueue {
  fn default() -> Self {
    Self::new()
  }
}

impl InMemoryQueue {
  pub fn new() -> Self {
    Self::with_clock(Arc::new(SystemClock))
  }

  pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
    Self {
      queues: Mutex::new(HashMap::new()),
      available: AtomicBool::new(true),
      clock,
    }
  }

  /// Simulates an outage: while unavailable every call fails with `QueueError::Unavailable`.
  pub fn set_available(&self, available: bool) {
    self.available.store(available, Ordering::SeqCst);
  }

  fn ensure_available(&self) -> Result<(), QueueError> {
    if self.available.load(Ordering::SeqCst) {
      Ok(())
    } else {
      Err(QueueError::Unavailable {
        message: "in-memory queue is marked unavailable".to_string(),
      })
    }
  }
}

fn queue_not_found(queue: &str) -> QueueError {
  QueueError::NotFound {
    queue: queue.to_string(),
  }
}

fn stale_receipt(queue: &str, message_id: &str) -> QueueError {
  QueueError::StaleReceipt {
    queue: queue.to_string(),
    message_id: message_id.to_string(),
  }
}

fn lease_end(now: DateTime<Utc>, lease: Duration) -> DateTime<Utc> {
  chrono::Duration::from_std(lease)
    .ok()
    .and_then(|lease| now.checked_add_signed(lease))
    .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[async_trait]
impl Queue for InMemoryQueue {
  async fn create_if_not_exists(&self, queue: &str) -> Result<(), QueueError> {
    self.ensure_available()?;
    self.queues.lock().entry(queue.to_string()).or_default();
    Ok(())
  }

  async fn enqueue(&self, queue: &str, payload: &str) -> Result<String, QueueError> {
    self.ensure_available()?;
    let now = self.clock.now();
    let mut queues = self.queues.lock();
    let messages = queues.get_mut(queue).ok_or_else(|| queue_not_found(queue))?;

    let message_id = Uuid::new_v4().to_string();
    messages.push_back(StoredMessage {
      message_id: message_id.clone(),
      body: payload.to_string(),
      inserted_at: now,
      dequeue_count: 0,
      visible_after: now,
      receipt: None,
    });
    event!(Level::TRACE, %queue, %message_id, "Message enqueued.");
    Ok(message_id)
  }

  async fn dequeue(&self, queue: &str, max_messages: usize, lease: Duration) -> Result<Vec<QueueMessage>, QueueError> {
    self.ensure_available()?;
    let now = self.clock.now();
    let visible_after = lease_end(now, lease);

    // Selection and lease assignment happen under one lock, which is what keeps
    // concurrent dequeues disjoint.
    let mut queues = self.queues.lock();
    let messages = queues.get_mut(queue).ok_or_else(|| queue_not_found(queue))?;

    let leased = messages
      .iter_mut()
      .filter(|m| m.visible_after <= now)
      .take(max_messages)
      .map(|m| {
        let receipt = ReceiptHandle::new(Uuid::new_v4().to_string());
        m.dequeue_count = m.dequeue_count.saturating_add(1);
        m.visible_after = visible_after;
        m.receipt = Some(receipt.clone());
        QueueMessage {
          message_id: m.message_id.clone(),
          receipt_handle: receipt,
          body: m.body.clone(),
          dequeue_count: m.dequeue_count,
          inserted_at: m.inserted_at,
          visible_after,
        }
      })
      .collect::<Vec<_>>();

    event!(Level::TRACE, %queue, leased = leased.len(), "Messages leased.");
    Ok(leased)
  }

  async fn delete(&self, queue: &str, message_id: &str, receipt: &ReceiptHandle) -> Result<(), QueueError> {
    self.ensure_available()?;
    let mut queues = self.queues.lock();
    let messages = queues.get_mut(queue).ok_or_else(|| queue_not_found(queue))?;

    let idx = messages
      .iter()
      .position(|m| m.message_id == message_id)
      .ok_or_else(|| stale_receipt(queue, message_id))?;
    if messages[idx].receipt.as_ref() != Some(receipt) {
      return Err(stale_receipt(queue, message_id));
    }

    messages.remove(idx);
    event!(Level::TRACE, %queue, %message_id, "Message deleted.");
    Ok(())
  }

  async fn release(&self, queue: &str, message_id: &str, receipt: &ReceiptHandle) -> Result<(), QueueError> {
    self.ensure_available()?;
    let now = self.clock.now();
    let mut queues = self.queues.lock();
    let messages = queues.get_mut(queue).ok_or_else(|| queue_not_found(queue))?;

    let message = messages
      .iter_mut()
      .find(|m| m.message_id == message_id)
      .ok_or_else(|| stale_receipt(queue, message_id))?;
    if message.receipt.as_ref() != Some(receipt) {
      return Err(stale_receipt(queue, message_id));
    }

    message.visible_after = now;
    message.receipt = None;
    Ok(())
  }

  async fn approximate_len(&self, queue: &str) -> Result<usize, QueueError> {
    self.ensure_available()?;
    let queues = self.queues.lock();
    queues.get(queue).map(VecDeque::len).ok_or_else(|| queue_not_found(queue))
  }
}
