// fulfillment/src/config.rs

use crate::error::{FulfillmentError, FulfillmentResult};
use crate::reconciler::ConcurrencyMode;
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_ORDER_QUEUE: &str = "order-processing";
pub const DEFAULT_DEAD_LETTER_QUEUE: &str = "order-processing-poison";
/// Connection string selecting the in-process store and queue.
pub const DEVELOPMENT_STORAGE: &str = "UseDevelopmentStorage=true";

/// Largest batch a single dequeue may request.
pub const MAX_BATCH_SIZE: usize = 32;

/// What happens to a message that keeps failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeadLetterPolicy {
  /// Leave it on the queue; it is redelivered after every lease expiry, indefinitely.
  RetryForever,
  /// Once a delivery's dequeue count exceeds `max_dequeue_count`, copy the body to
  /// `queue_name` and delete the original instead of processing it.
  MoveAfter { max_dequeue_count: u32, queue_name: String },
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
  pub storage_connection_string: String,
  pub queue_name: String,
  pub poll_interval: Duration,
  pub lease_duration: Duration,
  pub batch_size: usize,
  pub concurrency_mode: ConcurrencyMode,
  pub dead_letter: DeadLetterPolicy,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      storage_connection_string: DEVELOPMENT_STORAGE.to_string(),
      queue_name: DEFAULT_ORDER_QUEUE.to_string(),
      poll_interval: Duration::from_secs(30),
      lease_duration: Duration::from_secs(5 * 60),
      batch_size: 1,
      concurrency_mode: ConcurrencyMode::default(),
      dead_letter: DeadLetterPolicy::RetryForever,
    }
  }
}

impl WorkerConfig {
  pub fn from_env() -> FulfillmentResult<Self> {
    dotenv().ok(); // Load .env file if present
    Self::from_lookup(|name| env::var(name).ok())
  }

  /// Builds a config from an arbitrary variable source; `from_env` passes the process environment.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> FulfillmentResult<Self> {
    let defaults = Self::default();

    let storage_connection_string = lookup("STORAGE_CONNECTION_STRING")
      .ok_or_else(|| FulfillmentError::Config("Missing environment variable 'STORAGE_CONNECTION_STRING'".to_string()))?;
    let queue_name = lookup("ORDER_QUEUE_NAME").unwrap_or(defaults.queue_name);
    let poll_interval = Duration::from_secs(parse_var(&lookup, "POLL_INTERVAL_SECS", 30u64)?);
    let lease_duration = Duration::from_secs(parse_var(&lookup, "LEASE_DURATION_SECS", 300u64)?);
    let batch_size = parse_var(&lookup, "BATCH_SIZE", 1usize)?;
    let max_attempts = parse_var(&lookup, "MAX_UPDATE_ATTEMPTS", 3u32)?;

    let concurrency_mode = match lookup("CONCURRENCY_MODE").as_deref().map(str::trim) {
      None | Some("optimistic") => ConcurrencyMode::Optimistic { max_attempts },
      Some("last_writer_wins") => ConcurrencyMode::LastWriterWins,
      Some(other) => {
        return Err(FulfillmentError::Config(format!(
          "Invalid CONCURRENCY_MODE '{}': expected 'optimistic' or 'last_writer_wins'",
          other
        )))
      }
    };

    let dead_letter = match lookup("DEAD_LETTER_MAX_DEQUEUE_COUNT") {
      None => DeadLetterPolicy::RetryForever,
      Some(raw) => DeadLetterPolicy::MoveAfter {
        max_dequeue_count: raw
          .trim()
          .parse::<u32>()
          .map_err(|e| FulfillmentError::Config(format!("Invalid DEAD_LETTER_MAX_DEQUEUE_COUNT: {}", e)))?,
        queue_name: lookup("DEAD_LETTER_QUEUE_NAME").unwrap_or_else(|| DEFAULT_DEAD_LETTER_QUEUE.to_string()),
      },
    };

    let config = Self {
      storage_connection_string,
      queue_name,
      poll_interval,
      lease_duration,
      batch_size,
      concurrency_mode,
      dead_letter,
    };
    config.validate()?;

    tracing::info!(
      queue = %config.queue_name,
      poll_interval_secs = config.poll_interval.as_secs(),
      lease_secs = config.lease_duration.as_secs(),
      batch_size = config.batch_size,
      "Worker configuration loaded."
    );
    Ok(config)
  }

  pub fn validate(&self) -> FulfillmentResult<()> {
    if self.queue_name.trim().is_empty() {
      return Err(FulfillmentError::Config("Queue name must not be empty".to_string()));
    }
    if self.poll_interval.is_zero() {
      return Err(FulfillmentError::Config("Poll interval must be positive".to_string()));
    }
    if self.lease_duration.is_zero() {
      return Err(FulfillmentError::Config("Lease duration must be positive".to_string()));
    }
    if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
      return Err(FulfillmentError::Config(format!(
        "Batch size must be between 1 and {}, got {}",
        MAX_BATCH_SIZE, self.batch_size
      )));
    }
    if let ConcurrencyMode::Optimistic { max_attempts: 0 } = self.concurrency_mode {
      return Err(FulfillmentError::Config("MAX_UPDATE_ATTEMPTS must be at least 1".to_string()));
    }
    if let DeadLetterPolicy::MoveAfter {
      max_dequeue_count,
      queue_name,
    } = &self.dead_letter
    {
      if *max_dequeue_count == 0 {
        return Err(FulfillmentError::Config(
          "DEAD_LETTER_MAX_DEQUEUE_COUNT must be at least 1".to_string(),
        ));
      }
      if queue_name == &self.queue_name {
        return Err(FulfillmentError::Config(
          "Dead-letter queue must differ from the order queue".to_string(),
        ));
      }
    }
    Ok(())
  }

  pub fn uses_development_storage(&self) -> bool {
    self.storage_connection_string.trim().eq_ignore_ascii_case(DEVELOPMENT_STORAGE)
  }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> FulfillmentResult<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  match lookup(name) {
    None => Ok(default),
    Some(raw) => raw
      .trim()
      .parse::<T>()
      .map_err(|e| FulfillmentError::Config(format!("Invalid {}: {}", name, e))),
  }
}
