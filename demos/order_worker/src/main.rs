// demos/order_worker/src/main.rs

use anyhow::{bail, Context, Result};
use fulfillment::{
  provision, CatalogService, CustomerRecord, InMemoryEntityStore, InMemoryQueue, Order, OrderSubmitter, OrderWorker,
  ProductRecord, WorkerConfig,
};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan; // For span events in tracing

fn init_tracing() {
  let builder = tracing_subscriber::fmt()
    .with_max_level(Level::INFO) // Default level
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()) // Allow RUST_LOG override
    .with_span_events(FmtSpan::CLOSE); // Log when spans close, showing duration

  if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
    builder.json().init();
  } else {
    builder.init();
  }
}

async fn seed_catalog(catalog: &CatalogService) -> Result<()> {
  let products = [
    ProductRecord::new("P1", "Espresso Beans 1kg", 25).with_price_cents(2_450),
    ProductRecord::new("P2", "Burr Grinder", 3).with_price_cents(18_900),
    ProductRecord::new("P3", "Milk Jug", 12)
      .with_price_cents(1_299)
      .with_description("Stainless steel, 600ml"),
  ];
  for product in products {
    catalog.add_product(product).await?;
  }
  catalog
    .add_customer(CustomerRecord::new("C1", "Demo Customer", "customer@example.com"))
    .await?;
  Ok(())
}

async fn submit_samples(submitter: &OrderSubmitter) -> Result<()> {
  let orders = [
    Order::new("demo-1").with_item("P1", 2).with_item("P3", 1),
    // More grinders than are in stock: stays on the queue.
    Order::new("demo-2").with_item("P2", 10),
    // One unknown product: P1 is applied, the message is retained.
    Order::new("demo-3").with_item("P1", 1).with_item("P404", 1),
  ];
  for order in &orders {
    submitter.submit(order).await?;
  }
  // Not an order at all.
  submitter.submit_raw("{not json").await?;
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  dotenvy::dotenv().ok();
  init_tracing();

  tracing::info!("Starting order fulfillment worker...");

  let config = WorkerConfig::from_env().context("Failed to load worker configuration")?;
  if !config.uses_development_storage() {
    bail!("Only STORAGE_CONNECTION_STRING=UseDevelopmentStorage=true is supported by this demo");
  }

  let store = Arc::new(InMemoryEntityStore::new());
  let queue = Arc::new(InMemoryQueue::new());
  provision(&*store, &*queue, &config).await?;

  seed_catalog(&CatalogService::new(store.clone())).await?;
  submit_samples(&OrderSubmitter::new(queue.clone(), config.queue_name.clone())).await?;

  let worker = Arc::new(OrderWorker::new(store.clone(), queue.clone(), &config)?);
  let handle = worker.start_with_interval();
  tracing::info!(
    queue = %worker.queue_name(),
    poll_interval_secs = config.poll_interval.as_secs(),
    "Worker running; press Ctrl-C to stop."
  );

  tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
  tracing::info!("Shutdown requested, waiting for in-flight cycles...");
  handle.shutdown().await;

  for product in CatalogService::new(store).list_products().await? {
    tracing::info!(product_id = %product.row_key, stock = product.quantity_in_stock, "Final stock.");
  }
  Ok(())
}
