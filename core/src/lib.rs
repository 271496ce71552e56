// fulfillment/src/lib.rs

//! Fulfillment: a lease-based, at-least-once order fulfillment worker.
//!
//! Orders arrive as JSON messages on a queue. A scheduled worker leases them in small
//! batches and, per message:
//!  - decodes the order,
//!  - applies each line item against product stock in an entity store,
//!  - deletes the message only when every item was applied.
//!
//! Anything else leaves the message leased; it reappears after the lease expires and
//! is retried, or is moved to a dead-letter queue when a policy says so.

pub mod catalog;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod reconciler;
pub mod store;
pub mod worker;

// --- Re-exports for the Public API ---

pub use crate::catalog::CatalogService;
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::codec::{decode_order, encode_order};
pub use crate::config::{DeadLetterPolicy, WorkerConfig};
pub use crate::error::{DecodeError, FulfillmentError, FulfillmentResult, PipelineError, QueueError, StoreError};
pub use crate::models::{
  ConcurrencyToken, CustomerRecord, Entity, Order, OrderItem, ProductRecord, TableEntity, UpdateCondition,
};
pub use crate::pipeline::{ContextData, Pipeline, PipelineControl, PipelineResult};
pub use crate::queue::{InMemoryQueue, Queue, QueueMessage, ReceiptHandle};
pub use crate::reconciler::{ConcurrencyMode, InventoryReconciler, ReconcileOutcome, ReconcileReport};
pub use crate::store::{EntityStore, InMemoryEntityStore};
pub use crate::worker::{
  provision, CycleReport, MessageDisposition, OrderProcessor, OrderSubmitter, OrderWorker, RetainReason, Ticker,
  WorkerHandle,
};
