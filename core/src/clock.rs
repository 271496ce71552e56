// fulfillment/src/clock.rs

//! Wall-clock abstraction used for lease expiry and entity timestamps.
//!
//! Production code reads `SystemClock`; tests drive a `ManualClock` so lease
//! expiry can be exercised without sleeping.

use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

pub trait Clock: Debug + Send + Sync + 'static {
  fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
  base: DateTime<Utc>,
  elapsed_ms: AtomicI64,
}

impl ManualClock {
  pub fn new(base: DateTime<Utc>) -> Self {
    Self {
      base,
      elapsed_ms: AtomicI64::new(0),
    }
  }

  /// Anchored at the Unix epoch so test output is reproducible.
  pub fn at_epoch() -> Self {
    Self::new(DateTime::<Utc>::default())
  }

  pub fn advance(&self, by: Duration) {
    let ms = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
    self.elapsed_ms.fetch_add(ms, Ordering::SeqCst);
  }
}

impl Default for ManualClock {
  fn default() -> Self {
    Self::at_epoch()
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    let elapsed = chrono::Duration::milliseconds(self.elapsed_ms.load(Ordering::SeqCst));
    self.base.checked_add_signed(elapsed).unwrap_or(DateTime::<Utc>::MAX_UTC)
  }
}
