// fulfillment/src/error.rs
use anyhow::Error as AnyhowError;
use thiserror::Error;

/// Failure to turn a queue message body into an `Order`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
  #[error("Malformed order payload: {reason}")]
  MalformedPayload { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
  /// The row changed since it was read; re-read and recompute before retrying.
  #[error("Concurrency conflict on {table}({partition_key}, {row_key})")]
  ConcurrencyConflict {
    table: String,
    partition_key: String,
    row_key: String,
  },

  #[error("Entity already exists in {table}({partition_key}, {row_key})")]
  AlreadyExists {
    table: String,
    partition_key: String,
    row_key: String,
  },

  #[error("Entity not found in {table}({partition_key}, {row_key})")]
  NotFound {
    table: String,
    partition_key: String,
    row_key: String,
  },

  #[error("Table not found: {table}")]
  TableNotFound { table: String },

  #[error("Entity store unavailable: {message}")]
  Unavailable { message: String },

  #[error("Entity in {table} could not be mapped: {message}")]
  Mapping { table: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
  #[error("Queue not found: {queue}")]
  NotFound { queue: String },

  #[error("Queue service unavailable: {message}")]
  Unavailable { message: String },

  /// The receipt no longer identifies the current lease on the message.
  #[error("Stale receipt for message '{message_id}' on queue '{queue}'")]
  StaleReceipt { queue: String, message_id: String },
}

/// Framework-level failures raised by the step pipeline itself rather than by its handlers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
  #[error("Handler missing for non-optional step: {step_name}")]
  HandlerMissing { step_name: String },
}

#[derive(Debug, Error)]
pub enum FulfillmentError {
  #[error("Decode error: {0}")]
  Decode(#[from] DecodeError),

  #[error("Store error: {0}")]
  Store(#[from] StoreError),

  #[error("Queue error: {0}")]
  Queue(#[from] QueueError),

  #[error("Pipeline error: {0}")]
  Pipeline(#[from] PipelineError),

  #[error("Configuration error: {0}")]
  Config(String),

  #[error("Backend error. Source: {source}")]
  Backend {
    #[source]
    source: AnyhowError,
  },

  #[error("Internal fulfillment error: {0}")]
  Internal(String),
}

impl From<AnyhowError> for FulfillmentError {
  fn from(err: AnyhowError) -> Self {
    // Unwrap errors that already belong to the taxonomy so callers can still match on them.
    let err = match err.downcast::<StoreError>() {
      Ok(store_err) => return FulfillmentError::Store(store_err),
      Err(other) => other,
    };
    match err.downcast::<QueueError>() {
      Ok(queue_err) => FulfillmentError::Queue(queue_err),
      Err(other) => FulfillmentError::Backend { source: other },
    }
  }
}

pub type FulfillmentResult<T, E = FulfillmentError> = std::result::Result<T, E>;
