// tests/worker_tests.rs
mod common;

use async_trait::async_trait;
use common::*;
use fulfillment::config::DEFAULT_DEAD_LETTER_QUEUE;
use fulfillment::store::EntityStream;
use fulfillment::worker::manual_ticker;
use fulfillment::{
  ConcurrencyMode, ConcurrencyToken, CycleReport, DeadLetterPolicy, DecodeError, Entity, EntityStore,
  InventoryReconciler, MessageDisposition, Order, OrderProcessor, OrderSubmitter, OrderWorker, Queue,
  ReconcileOutcome, RetainReason, StoreError, UpdateCondition, WorkerConfig,
};
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

const SCENARIO_1: &str = r#"{"OrderId":"O1","Items":[{"ProductId":"P1","Quantity":2}]}"#;
const SCENARIO_2: &str = r#"{"OrderId":"O2","Items":[{"ProductId":"P2","Quantity":10}]}"#;
const SCENARIO_3: &str = r#"{"OrderId":"O3","Items":[{"ProductId":"P1","Quantity":1},{"ProductId":"P9","Quantity":1}]}"#;
const SCENARIO_4: &str = "{not json";

fn processor_for(h: &Harness, store: Arc<dyn EntityStore>) -> OrderProcessor {
  OrderProcessor::new(
    h.queue.clone(),
    h.config.queue_name.clone(),
    InventoryReconciler::new(store, h.config.concurrency_mode),
    &h.config.dead_letter,
  )
}

async fn lease_one(h: &Harness) -> fulfillment::QueueMessage {
  let mut leased = h
    .queue
    .dequeue(&h.config.queue_name, 1, h.config.lease_duration)
    .await
    .unwrap();
  assert_eq!(leased.len(), 1, "expected one visible message");
  leased.remove(0)
}

#[tokio::test]
#[serial]
async fn test_fully_applied_order_is_deleted() {
  setup_tracing();
  let h = Harness::new().await;
  h.seed_product("P1", 5).await;
  h.enqueue(SCENARIO_1).await;

  let report = h.worker().run_cycle().await;

  assert_eq!(
    report,
    CycleReport {
      fetched: 1,
      completed: 1,
      ..Default::default()
    }
  );
  assert_eq!(h.stock("P1").await, Some(3));
  assert_eq!(h.queue_len().await, 0);
}

#[tokio::test]
#[serial]
async fn test_insufficient_stock_retains_message_unchanged() {
  setup_tracing();
  let h = Harness::new().await;
  h.seed_product("P2", 3).await;
  h.enqueue(SCENARIO_2).await;

  let message = lease_one(&h).await;
  let disposition = processor_for(&h, h.store.clone()).process(message).await;

  match disposition {
    MessageDisposition::Retained(RetainReason::Incomplete(report)) => assert_eq!(
      report.outcomes,
      vec![ReconcileOutcome::InsufficientStock {
        product_id: "P2".into(),
        requested: 10,
        available: 3
      }]
    ),
    other => panic!("expected an incomplete order, got {:?}", other),
  }
  assert_eq!(h.stock("P2").await, Some(3));
  assert_eq!(h.queue_len().await, 1);
}

#[tokio::test]
#[serial]
async fn test_partial_order_applies_valid_items_and_retains() {
  setup_tracing();
  let h = Harness::new().await;
  h.seed_product("P1", 5).await;
  h.enqueue(SCENARIO_3).await;

  let message = lease_one(&h).await;
  let disposition = processor_for(&h, h.store.clone()).process(message).await;

  let MessageDisposition::Retained(RetainReason::Incomplete(report)) = disposition else {
    panic!("expected an incomplete order, got {:?}", disposition);
  };
  assert_eq!(
    report.outcomes,
    vec![
      ReconcileOutcome::Applied {
        product_id: "P1".into(),
        quantity: 1,
        remaining: 4
      },
      ReconcileOutcome::ProductNotFound { product_id: "P9".into() },
    ]
  );
  assert_eq!(h.stock("P1").await, Some(4));
  assert_eq!(h.queue_len().await, 1);
}

#[tokio::test]
#[serial]
async fn test_malformed_payload_makes_no_store_calls() {
  setup_tracing();
  let h = Harness::new().await;
  let counting = Arc::new(CountingStore::new(h.store.clone()));
  h.enqueue(SCENARIO_4).await;

  let message = lease_one(&h).await;
  let disposition = processor_for(&h, counting.clone()).process(message).await;

  assert!(matches!(
    disposition,
    MessageDisposition::Retained(RetainReason::MalformedPayload(DecodeError::MalformedPayload { .. }))
  ));
  assert_eq!(counting.total_calls(), 0);
  assert_eq!(h.queue_len().await, 1);
}

#[tokio::test]
#[serial]
async fn test_retained_message_is_redelivered_after_lease_expiry() {
  setup_tracing();
  let h = Harness::new().await;
  h.seed_product("P2", 3).await;
  h.enqueue(SCENARIO_2).await;
  let worker = h.worker();

  assert_eq!(worker.run_cycle().await.retained, 1);
  // Still leased: nothing to fetch.
  assert_eq!(worker.run_cycle().await.fetched, 0);

  // Restock, let the lease lapse, and the retry succeeds.
  let catalog = h.catalog();
  let mut product = catalog
    .get_product(fulfillment::models::PRODUCTS_PARTITION, "P2")
    .await
    .unwrap()
    .unwrap();
  product.quantity_in_stock = 12;
  catalog.update_product(product).await.unwrap();
  h.clock.advance(h.config.lease_duration);

  let report = worker.run_cycle().await;
  assert_eq!(report.completed, 1);
  assert_eq!(h.stock("P2").await, Some(2));
  assert_eq!(h.queue_len().await, 0);
}

#[tokio::test]
#[serial]
async fn test_empty_order_is_acknowledged() {
  setup_tracing();
  let h = Harness::new().await;
  h.enqueue(r#"{"OrderId":"E1","Items":[]}"#).await;

  let report = h.worker().run_cycle().await;
  assert_eq!(report.completed, 1);
  assert_eq!(h.queue_len().await, 0);
}

#[tokio::test]
#[serial]
async fn test_batch_failures_do_not_abort_the_cycle() {
  setup_tracing();
  let h = Harness::with_config(WorkerConfig {
    batch_size: 4,
    ..Default::default()
  })
  .await;
  h.seed_product("P1", 5).await;
  h.enqueue(SCENARIO_4).await;
  h.enqueue(SCENARIO_1).await;
  h.enqueue(SCENARIO_2).await;
  h.enqueue(SCENARIO_1).await;

  let report = h.worker().run_cycle().await;

  assert_eq!(
    report,
    CycleReport {
      fetched: 4,
      completed: 2,
      retained: 2,
      ..Default::default()
    }
  );
  assert_eq!(h.stock("P1").await, Some(1));
  assert_eq!(h.queue_len().await, 2);
}

#[tokio::test]
#[serial]
async fn test_store_outage_is_caught_and_message_retried() {
  setup_tracing();
  let h = Harness::new().await;
  h.seed_product("P1", 5).await;
  h.enqueue(SCENARIO_1).await;
  let worker = h.worker();

  h.store.set_available(false);
  let report = worker.run_cycle().await;
  assert_eq!(report.failed, 1);
  assert_eq!(h.queue_len().await, 1);

  h.store.set_available(true);
  h.clock.advance(h.config.lease_duration);
  assert_eq!(worker.run_cycle().await.completed, 1);
  assert_eq!(h.stock("P1").await, Some(3));
}

#[tokio::test]
#[serial]
async fn test_fetch_failure_is_reported_not_raised() {
  setup_tracing();
  let h = Harness::new().await;
  h.queue.set_available(false);

  let report = h.worker().run_cycle().await;
  assert!(report.fetch_failed);
  assert_eq!(report.fetched, 0);
}

#[tokio::test]
#[serial]
async fn test_lost_lease_after_apply_still_counts_as_completed() {
  setup_tracing();
  let h = Harness::new().await;
  h.seed_product("P1", 5).await;
  h.enqueue(SCENARIO_1).await;

  let first = lease_one(&h).await;
  h.clock.advance(h.config.lease_duration);
  let second = lease_one(&h).await;
  assert_eq!(second.dequeue_count, 2);

  let disposition = processor_for(&h, h.store.clone()).process(first).await;
  assert!(disposition.is_completed());
  assert_eq!(h.stock("P1").await, Some(3));
  // The second holder still owns the message and will apply it again.
  assert_eq!(h.queue_len().await, 1);
}

#[tokio::test]
#[serial]
async fn test_dead_letter_policy_moves_poison_message() {
  setup_tracing();
  let h = Harness::with_config(WorkerConfig {
    dead_letter: DeadLetterPolicy::MoveAfter {
      max_dequeue_count: 2,
      queue_name: DEFAULT_DEAD_LETTER_QUEUE.to_string(),
    },
    ..Default::default()
  })
  .await;
  h.enqueue(SCENARIO_4).await;
  let worker = h.worker();

  for _ in 0..2 {
    assert_eq!(worker.run_cycle().await.retained, 1);
    h.clock.advance(h.config.lease_duration);
  }
  let report = worker.run_cycle().await;

  assert_eq!(report.dead_lettered, 1);
  assert_eq!(h.queue_len().await, 0);
  let parked = h.queue.dequeue(DEFAULT_DEAD_LETTER_QUEUE, 5, Duration::from_secs(1)).await.unwrap();
  assert_eq!(parked.len(), 1);
  assert_eq!(parked[0].body, SCENARIO_4);
}

#[tokio::test]
#[serial]
async fn test_retry_forever_never_dead_letters() {
  setup_tracing();
  let h = Harness::new().await;
  h.enqueue(SCENARIO_4).await;
  let worker = h.worker();

  for _ in 0..6 {
    assert_eq!(worker.run_cycle().await.retained, 1);
    h.clock.advance(h.config.lease_duration);
  }
  let message = lease_one(&h).await;
  assert_eq!(message.dequeue_count, 7);
  assert_eq!(h.queue_len().await, 1);
}

#[tokio::test]
#[serial]
async fn test_submitter_enqueues_wire_payload() {
  setup_tracing();
  let h = Harness::new().await;
  h.seed_product("P1", 5).await;
  let submitter = OrderSubmitter::new(h.queue.clone(), h.config.queue_name.clone());

  submitter.submit(&Order::new("O1").with_item("P1", 2)).await.unwrap();
  let message = lease_one(&h).await;
  assert_eq!(message.body, SCENARIO_1);

  let err = submitter.submit(&Order::new("bad").with_item("P1", 0)).await.unwrap_err();
  assert!(matches!(err, fulfillment::FulfillmentError::Decode(_)));
}

#[tokio::test]
#[serial]
async fn test_invalid_config_is_rejected_by_worker() {
  let h = Harness::new().await;
  let config = WorkerConfig {
    batch_size: 0,
    concurrency_mode: ConcurrencyMode::LastWriterWins,
    ..Default::default()
  };
  assert!(OrderWorker::new(h.store.clone(), h.queue.clone(), &config).is_err());
}

/// Parks every `get` until the test opens the gate.
struct GatedStore {
  inner: Arc<dyn EntityStore>,
  entered: Arc<Notify>,
  gate: Arc<Semaphore>,
}

#[async_trait]
impl EntityStore for GatedStore {
  async fn create_table_if_not_exists(&self, table: &str) -> Result<(), StoreError> {
    self.inner.create_table_if_not_exists(table).await
  }

  async fn get(&self, table: &str, partition_key: &str, row_key: &str) -> Result<Option<Entity>, StoreError> {
    self.entered.notify_one();
    self.gate.acquire().await.unwrap().forget();
    self.inner.get(table, partition_key, row_key).await
  }

  async fn add(&self, table: &str, entity: Entity) -> Result<ConcurrencyToken, StoreError> {
    self.inner.add(table, entity).await
  }

  async fn update(&self, table: &str, entity: Entity, condition: UpdateCondition) -> Result<ConcurrencyToken, StoreError> {
    self.inner.update(table, entity, condition).await
  }

  async fn delete(&self, table: &str, partition_key: &str, row_key: &str) -> Result<(), StoreError> {
    self.inner.delete(table, partition_key, row_key).await
  }

  fn scan<'a>(&'a self, table: &'a str, partition_key: Option<&'a str>) -> EntityStream<'a> {
    self.inner.scan(table, partition_key)
  }
}

#[tokio::test]
#[serial]
async fn test_stop_mid_batch_finishes_current_message_and_releases_the_rest() {
  setup_tracing();
  let h = Harness::with_config(WorkerConfig {
    batch_size: 3,
    ..Default::default()
  })
  .await;
  h.seed_product("P1", 5).await;
  for _ in 0..3 {
    h.enqueue(SCENARIO_1).await;
  }

  let entered = Arc::new(Notify::new());
  let gate = Arc::new(Semaphore::new(0));
  let gated = Arc::new(GatedStore {
    inner: h.store.clone(),
    entered: entered.clone(),
    gate: gate.clone(),
  });
  let worker = Arc::new(h.worker_over(gated));

  let (trigger, ticker) = manual_ticker();
  let handle = worker.start(ticker);
  let reports = handle.reports();
  assert!(trigger.fire());

  // The first message is now mid-reconcile.
  entered.notified().await;
  handle.stop();
  gate.add_permits(16);
  handle.shutdown().await;

  let report = reports.borrow().clone().expect("one cycle ran");
  assert_eq!(
    report,
    CycleReport {
      fetched: 3,
      completed: 1,
      released: 2,
      ..Default::default()
    }
  );
  assert_eq!(h.stock("P1").await, Some(3));

  // Released messages are visible again without waiting for the lease.
  let again = h.queue.dequeue(&h.config.queue_name, 5, h.config.lease_duration).await.unwrap();
  assert_eq!(again.len(), 2);
  assert!(again.iter().all(|m| m.dequeue_count == 2));
}

#[tokio::test]
#[serial]
async fn test_stopping_one_handle_leaves_another_processing() {
  setup_tracing();
  let h = Harness::new().await;
  h.seed_product("P1", 5).await;
  let worker = Arc::new(h.worker());

  let (_trigger1, ticker1) = manual_ticker();
  let handle1 = worker.start(ticker1);
  let (trigger2, ticker2) = manual_ticker();
  let handle2 = worker.start(ticker2);
  let mut progress = handle2.progress();
  let reports = handle2.reports();

  handle1.shutdown().await;
  assert!(!handle2.is_stopped());

  h.enqueue(SCENARIO_1).await;
  assert!(trigger2.fire());
  progress.wait_for(|p| p.finished == 1).await.unwrap();

  assert_eq!(
    reports.borrow().clone(),
    Some(CycleReport {
      fetched: 1,
      completed: 1,
      ..Default::default()
    })
  );
  assert_eq!(h.stock("P1").await, Some(3));
  handle2.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_direct_cycle_after_shutdown_still_processes() {
  setup_tracing();
  let h = Harness::new().await;
  h.seed_product("P1", 5).await;
  let worker = Arc::new(h.worker());

  let (_trigger, ticker) = manual_ticker();
  worker.start(ticker).shutdown().await;

  h.enqueue(SCENARIO_1).await;
  let report = worker.run_cycle().await;
  assert_eq!(report.completed, 1);
  assert_eq!(report.released, 0);
  assert_eq!(h.stock("P1").await, Some(3));
  assert_eq!(h.queue_len().await, 0);
}
