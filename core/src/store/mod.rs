// fulfillment/src/store/mod.rs

//! The entity store contract consumed by the catalog and the inventory reconciler.
//!
//! Rows live in named tables and are addressed by `(partition_key, row_key)`.
//! Every successful write returns a fresh `ConcurrencyToken`; conditional updates
//! compare against it to detect lost updates.

pub mod memory;

use crate::error::StoreError;
use crate::models::{ConcurrencyToken, Entity, UpdateCondition};
use async_trait::async_trait;
use futures_util::stream::BoxStream;

pub use memory::InMemoryEntityStore;

pub type EntityStream<'a> = BoxStream<'a, Result<Entity, StoreError>>;

#[async_trait]
pub trait EntityStore: Send + Sync + 'static {
  async fn create_table_if_not_exists(&self, table: &str) -> Result<(), StoreError>;

  /// Returns `Ok(None)` when the row is absent.
  async fn get(&self, table: &str, partition_key: &str, row_key: &str) -> Result<Option<Entity>, StoreError>;

  /// Fails with `AlreadyExists` on a duplicate key.
  async fn add(&self, table: &str, entity: Entity) -> Result<ConcurrencyToken, StoreError>;

  /// Replaces the stored row. With `UpdateCondition::IfMatch` a stale token fails
  /// with `ConcurrencyConflict`; an absent row fails with `NotFound`.
  async fn update(&self, table: &str, entity: Entity, condition: UpdateCondition)
    -> Result<ConcurrencyToken, StoreError>;

  /// Idempotent: deleting an absent row is not an error.
  async fn delete(&self, table: &str, partition_key: &str, row_key: &str) -> Result<(), StoreError>;

  /// Streams every row of `table`, optionally restricted to one partition. Unordered.
  fn scan<'a>(&'a self, table: &'a str, partition_key: Option<&'a str>) -> EntityStream<'a>;
}
