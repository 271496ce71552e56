// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use async_trait::async_trait;
use fulfillment::models::{PRODUCTS_PARTITION, PRODUCTS_TABLE};
use fulfillment::store::EntityStream;
use fulfillment::{
  provision, CatalogService, ConcurrencyToken, Entity, EntityStore, InMemoryEntityStore, InMemoryQueue, ManualClock,
  OrderWorker, ProductRecord, Queue, StoreError, TableEntity, UpdateCondition, WorkerConfig,
};
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::Level;

// --- Helper for Tracing Setup ---
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok(); // Another test binary may have installed one already
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

pub const QUEUE: &str = "order-processing";

// --- In-process backends wired together ---
pub struct Harness {
  pub clock: Arc<ManualClock>,
  pub store: Arc<InMemoryEntityStore>,
  pub queue: Arc<InMemoryQueue>,
  pub config: WorkerConfig,
}

impl Harness {
  pub async fn new() -> Self {
    Self::with_config(WorkerConfig::default()).await
  }

  pub async fn with_config(config: WorkerConfig) -> Self {
    let clock = Arc::new(ManualClock::at_epoch());
    let store = Arc::new(InMemoryEntityStore::with_clock(clock.clone()));
    let queue = Arc::new(InMemoryQueue::with_clock(clock.clone()));
    provision(&*store, &*queue, &config).await.unwrap();
    Self {
      clock,
      store,
      queue,
      config,
    }
  }

  pub fn catalog(&self) -> CatalogService {
    CatalogService::new(self.store.clone())
  }

  pub fn worker(&self) -> OrderWorker {
    OrderWorker::new(self.store.clone(), self.queue.clone(), &self.config).unwrap()
  }

  pub fn worker_over(&self, store: Arc<dyn EntityStore>) -> OrderWorker {
    OrderWorker::new(store, self.queue.clone(), &self.config).unwrap()
  }

  pub async fn seed_product(&self, product_id: &str, stock: u32) {
    self
      .catalog()
      .add_product(ProductRecord::new(product_id, format!("Product {}", product_id), stock))
      .await
      .unwrap();
  }

  pub async fn stock(&self, product_id: &str) -> Option<u32> {
    stock_of(&*self.store, product_id).await
  }

  pub async fn enqueue(&self, body: &str) -> String {
    self.queue.enqueue(&self.config.queue_name, body).await.unwrap()
  }

  pub async fn queue_len(&self) -> usize {
    self.queue.approximate_len(&self.config.queue_name).await.unwrap()
  }
}

pub async fn stock_of(store: &dyn EntityStore, product_id: &str) -> Option<u32> {
  store
    .get(PRODUCTS_TABLE, PRODUCTS_PARTITION, product_id)
    .await
    .unwrap()
    .map(|e| ProductRecord::from_entity(e).unwrap().quantity_in_stock)
}

// --- Store wrappers ---

/// Counts calls that reach the wrapped store.
pub struct CountingStore {
  inner: Arc<dyn EntityStore>,
  pub gets: AtomicUsize,
  pub updates: AtomicUsize,
}

impl CountingStore {
  pub fn new(inner: Arc<dyn EntityStore>) -> Self {
    Self {
      inner,
      gets: AtomicUsize::new(0),
      updates: AtomicUsize::new(0),
    }
  }

  pub fn total_calls(&self) -> usize {
    self.gets.load(Ordering::SeqCst) + self.updates.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl EntityStore for CountingStore {
  async fn create_table_if_not_exists(&self, table: &str) -> Result<(), StoreError> {
    self.inner.create_table_if_not_exists(table).await
  }

  async fn get(&self, table: &str, partition_key: &str, row_key: &str) -> Result<Option<Entity>, StoreError> {
    self.gets.fetch_add(1, Ordering::SeqCst);
    self.inner.get(table, partition_key, row_key).await
  }

  async fn add(&self, table: &str, entity: Entity) -> Result<ConcurrencyToken, StoreError> {
    self.inner.add(table, entity).await
  }

  async fn update(&self, table: &str, entity: Entity, condition: UpdateCondition) -> Result<ConcurrencyToken, StoreError> {
    self.updates.fetch_add(1, Ordering::SeqCst);
    self.inner.update(table, entity, condition).await
  }

  async fn delete(&self, table: &str, partition_key: &str, row_key: &str) -> Result<(), StoreError> {
    self.inner.delete(table, partition_key, row_key).await
  }

  fn scan<'a>(&'a self, table: &'a str, partition_key: Option<&'a str>) -> EntityStream<'a> {
    self.inner.scan(table, partition_key)
  }
}

/// Simulates a competing writer: before each of the first `races` updates, another
/// writer takes `steal` units from the same product row, invalidating the caller's token.
pub struct RacingStore {
  inner: Arc<dyn EntityStore>,
  races: AtomicUsize,
  steal: u32,
  pub updates: AtomicUsize,
}

impl RacingStore {
  pub fn new(inner: Arc<dyn EntityStore>, races: usize, steal: u32) -> Self {
    Self {
      inner,
      races: AtomicUsize::new(races),
      steal,
      updates: AtomicUsize::new(0),
    }
  }

  async fn interfere(&self, entity: &Entity) {
    let current = self
      .inner
      .get(PRODUCTS_TABLE, &entity.partition_key, &entity.row_key)
      .await
      .unwrap()
      .unwrap();
    let mut product = ProductRecord::from_entity(current).unwrap();
    product.quantity_in_stock = product.quantity_in_stock.saturating_sub(self.steal);
    self
      .inner
      .update(PRODUCTS_TABLE, product.to_entity().unwrap(), UpdateCondition::Any)
      .await
      .unwrap();
  }
}

#[async_trait]
impl EntityStore for RacingStore {
  async fn create_table_if_not_exists(&self, table: &str) -> Result<(), StoreError> {
    self.inner.create_table_if_not_exists(table).await
  }

  async fn get(&self, table: &str, partition_key: &str, row_key: &str) -> Result<Option<Entity>, StoreError> {
    self.inner.get(table, partition_key, row_key).await
  }

  async fn add(&self, table: &str, entity: Entity) -> Result<ConcurrencyToken, StoreError> {
    self.inner.add(table, entity).await
  }

  async fn update(&self, table: &str, entity: Entity, condition: UpdateCondition) -> Result<ConcurrencyToken, StoreError> {
    self.updates.fetch_add(1, Ordering::SeqCst);
    let race = self
      .races
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if race {
      self.interfere(&entity).await;
    }
    self.inner.update(table, entity, condition).await
  }

  async fn delete(&self, table: &str, partition_key: &str, row_key: &str) -> Result<(), StoreError> {
    self.inner.delete(table, partition_key, row_key).await
  }

  fn scan<'a>(&'a self, table: &'a str, partition_key: Option<&'a str>) -> EntityStream<'a> {
    self.inner.scan(table, partition_key)
  }
}

/// Deletes `product_id` from the inner store right before the first update to that row
/// reaches it, as if another writer removed the product between read and write.
pub struct VanishingStore {
  inner: Arc<dyn EntityStore>,
  product_id: String,
  vanished: AtomicUsize,
}

impl VanishingStore {
  pub fn new(inner: Arc<dyn EntityStore>, product_id: &str) -> Self {
    Self {
      inner,
      product_id: product_id.to_string(),
      vanished: AtomicUsize::new(0),
    }
  }
}

#[async_trait]
impl EntityStore for VanishingStore {
  async fn create_table_if_not_exists(&self, table: &str) -> Result<(), StoreError> {
    self.inner.create_table_if_not_exists(table).await
  }

  async fn get(&self, table: &str, partition_key: &str, row_key: &str) -> Result<Option<Entity>, StoreError> {
    self.inner.get(table, partition_key, row_key).await
  }

  async fn add(&self, table: &str, entity: Entity) -> Result<ConcurrencyToken, StoreError> {
    self.inner.add(table, entity).await
  }

  async fn update(&self, table: &str, entity: Entity, condition: UpdateCondition) -> Result<ConcurrencyToken, StoreError> {
    if entity.row_key == self.product_id && self.vanished.fetch_add(1, Ordering::SeqCst) == 0 {
      self
        .inner
        .delete(table, &entity.partition_key, &entity.row_key)
        .await
        .unwrap();
    }
    self.inner.update(table, entity, condition).await
  }

  async fn delete(&self, table: &str, partition_key: &str, row_key: &str) -> Result<(), StoreError> {
    self.inner.delete(table, partition_key, row_key).await
  }

  fn scan<'a>(&'a self, table: &'a str, partition_key: Option<&'a str>) -> EntityStream<'a> {
    self.inner.scan(table, partition_key)
  }
}
