// fulfillment/src/worker/provision.rs

use crate::config::{DeadLetterPolicy, WorkerConfig};
use crate::error::FulfillmentResult;
use crate::models::{CUSTOMERS_TABLE, PRODUCTS_TABLE};
use crate::queue::Queue;
use crate::store::EntityStore;
use tracing::{info, instrument};

/// Creates the `Customers` and `Products` tables, the order queue and, when a dead-letter
/// policy is configured, the dead-letter queue. Safe to run repeatedly.
#[instrument(name = "provision", skip_all, fields(queue = %config.queue_name), err(Display))]
pub async fn provision(store: &dyn EntityStore, queue: &dyn Queue, config: &WorkerConfig) -> FulfillmentResult<()> {
  for table in [CUSTOMERS_TABLE, PRODUCTS_TABLE] {
    store.create_table_if_not_exists(table).await?;
  }

  queue.create_if_not_exists(&config.queue_name).await?;
  if let DeadLetterPolicy::MoveAfter { queue_name, .. } = &config.dead_letter {
    queue.create_if_not_exists(queue_name).await?;
  }

  info!("Storage provisioned.");
  Ok(())
}
