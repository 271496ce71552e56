// fulfillment/src/catalog.rs

//! Typed product and customer operations over an `EntityStore`.

use crate::error::FulfillmentResult;
use crate::models::{CustomerRecord, ProductRecord, TableEntity, UpdateCondition};
use crate::store::EntityStore;
use futures_util::TryStreamExt;
use std::sync::Arc;
use tracing::{event, instrument, Level};
use uuid::Uuid;

#[derive(Clone)]
pub struct CatalogService {
  store: Arc<dyn EntityStore>,
}

impl CatalogService {
  pub fn new(store: Arc<dyn EntityStore>) -> Self {
    Self { store }
  }

  // --- Products ---

  pub async fn get_product(&self, partition_key: &str, row_key: &str) -> FulfillmentResult<Option<ProductRecord>> {
    self.get_record(partition_key, row_key).await
  }

  /// Adds a product, assigning a fresh row key when none is set. Returns the stored record.
  pub async fn add_product(&self, product: ProductRecord) -> FulfillmentResult<ProductRecord> {
    self.add_record(product).await
  }

  pub async fn update_product(&self, product: ProductRecord) -> FulfillmentResult<ProductRecord> {
    self.update_record(product).await
  }

  pub async fn delete_product(&self, partition_key: &str, row_key: &str) -> FulfillmentResult<()> {
    self.delete_record::<ProductRecord>(partition_key, row_key).await
  }

  pub async fn list_products(&self) -> FulfillmentResult<Vec<ProductRecord>> {
    self.list_records().await
  }

  // --- Customers ---

  pub async fn get_customer(&self, partition_key: &str, row_key: &str) -> FulfillmentResult<Option<CustomerRecord>> {
    self.get_record(partition_key, row_key).await
  }

  pub async fn add_customer(&self, customer: CustomerRecord) -> FulfillmentResult<CustomerRecord> {
    self.add_record(customer).await
  }

  pub async fn update_customer(&self, customer: CustomerRecord) -> FulfillmentResult<CustomerRecord> {
    self.update_record(customer).await
  }

  pub async fn delete_customer(&self, partition_key: &str, row_key: &str) -> FulfillmentResult<()> {
    self.delete_record::<CustomerRecord>(partition_key, row_key).await
  }

  pub async fn list_customers(&self) -> FulfillmentResult<Vec<CustomerRecord>> {
    self.list_records().await
  }

  // --- Shared record plumbing ---

  #[instrument(name = "Catalog::get", skip(self), fields(table = T::TABLE), err(Display))]
  async fn get_record<T: TableEntity>(&self, partition_key: &str, row_key: &str) -> FulfillmentResult<Option<T>> {
    match self.store.get(T::TABLE, partition_key, row_key).await? {
      Some(entity) => Ok(Some(T::from_entity(entity)?)),
      None => {
        event!(Level::WARN, %partition_key, %row_key, "Record not found.");
        Ok(None)
      }
    }
  }

  #[instrument(name = "Catalog::add", skip_all, fields(table = T::TABLE), err(Display))]
  async fn add_record<T: TableEntity + WithRowKey>(&self, mut record: T) -> FulfillmentResult<T> {
    if record.row_key().is_empty() {
      record.assign_row_key(Uuid::new_v4().to_string());
    }
    let token = self.store.add(T::TABLE, record.to_entity()?).await?;
    record.set_concurrency_token(Some(token));
    event!(Level::INFO, row_key = %record.row_key(), "Record added.");
    Ok(record)
  }

  /// Replaces a record. A record read from the store carries its token and is updated
  /// conditionally; a record without one overwrites unconditionally.
  #[instrument(name = "Catalog::update", skip_all, fields(table = T::TABLE, row_key = %record.row_key()), err(Display))]
  async fn update_record<T: TableEntity>(&self, mut record: T) -> FulfillmentResult<T> {
    let condition = match record.concurrency_token() {
      Some(token) => UpdateCondition::IfMatch(token.clone()),
      None => UpdateCondition::Any,
    };
    let token = self.store.update(T::TABLE, record.to_entity()?, condition).await?;
    record.set_concurrency_token(Some(token));
    Ok(record)
  }

  #[instrument(name = "Catalog::delete", skip(self), fields(table = T::TABLE), err(Display))]
  async fn delete_record<T: TableEntity>(&self, partition_key: &str, row_key: &str) -> FulfillmentResult<()> {
    self.store.delete(T::TABLE, partition_key, row_key).await?;
    Ok(())
  }

  #[instrument(name = "Catalog::list", skip(self), fields(table = T::TABLE), err(Display))]
  async fn list_records<T: TableEntity>(&self) -> FulfillmentResult<Vec<T>> {
    let records = self
      .store
      .scan(T::TABLE, None)
      .and_then(|entity| async move { T::from_entity(entity) })
      .try_collect::<Vec<T>>()
      .await?;
    Ok(records)
  }
}

/// Records whose row key the catalog may assign on insert.
pub trait WithRowKey {
  fn assign_row_key(&mut self, row_key: String);
}

impl WithRowKey for ProductRecord {
  fn assign_row_key(&mut self, row_key: String) {
    self.row_key = row_key;
  }
}

impl WithRowKey for CustomerRecord {
  fn assign_row_key(&mut self, row_key: String) {
    self.row_key = row_key;
  }
}
