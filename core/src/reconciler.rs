// fulfillment/src/reconciler.rs

//! Applies a decoded `Order` against product stock, one line item at a time.
//!
//! Items are independent: a missing product or short stock on one line is recorded
//! and the next line is still attempted. The caller only treats the order as done
//! when every line was applied.

use crate::error::StoreError;
use crate::models::{Order, OrderItem, ProductRecord, TableEntity, UpdateCondition, PRODUCTS_PARTITION, PRODUCTS_TABLE};
use crate::store::EntityStore;
use std::sync::Arc;
use tracing::{event, instrument, Level};

/// How product rows are written back after a decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyMode {
  /// Conditional update against the token that was read. On conflict the row is
  /// re-read and the decrement recomputed, up to `max_attempts` writes in total.
  Optimistic { max_attempts: u32 },
  /// Unconditional overwrite. Concurrent orders on the same product can lose updates.
  LastWriterWins,
}

impl Default for ConcurrencyMode {
  fn default() -> Self {
    ConcurrencyMode::Optimistic { max_attempts: 3 }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
  Applied {
    product_id: String,
    quantity: u32,
    remaining: u32,
  },
  ProductNotFound {
    product_id: String,
  },
  InsufficientStock {
    product_id: String,
    requested: u32,
    available: u32,
  },
  /// Every conditional write lost a race.
  ConcurrencyConflict {
    product_id: String,
    attempts: u32,
  },
}

impl ReconcileOutcome {
  pub fn is_applied(&self) -> bool {
    matches!(self, ReconcileOutcome::Applied { .. })
  }

  pub fn product_id(&self) -> &str {
    match self {
      ReconcileOutcome::Applied { product_id, .. }
      | ReconcileOutcome::ProductNotFound { product_id }
      | ReconcileOutcome::InsufficientStock { product_id, .. }
      | ReconcileOutcome::ConcurrencyConflict { product_id, .. } => product_id,
    }
  }
}

/// Outcomes for one order, in item order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
  pub order_id: String,
  pub outcomes: Vec<ReconcileOutcome>,
}

impl ReconcileReport {
  /// True when every item was applied. An order with no items is trivially complete.
  pub fn is_fully_applied(&self) -> bool {
    self.outcomes.iter().all(ReconcileOutcome::is_applied)
  }

  pub fn failures(&self) -> impl Iterator<Item = &ReconcileOutcome> {
    self.outcomes.iter().filter(|o| !o.is_applied())
  }
}

#[derive(Clone)]
pub struct InventoryReconciler {
  store: Arc<dyn EntityStore>,
  mode: ConcurrencyMode,
}

impl InventoryReconciler {
  pub fn new(store: Arc<dyn EntityStore>, mode: ConcurrencyMode) -> Self {
    Self { store, mode }
  }

  /// Applies every item of `order` in sequence.
  ///
  /// A store failure other than a handled conflict or a row vanishing mid-update stops the order and is
  /// returned; items applied before it stay applied.
  #[instrument(name = "InventoryReconciler::reconcile", skip_all, fields(order_id = %order.order_id, items = order.items.len()), err(Display))]
  pub async fn reconcile(&self, order: &Order) -> Result<ReconcileReport, StoreError> {
    let mut outcomes = Vec::with_capacity(order.items.len());
    for item in &order.items {
      let outcome = self.apply_item(item).await?;
      match &outcome {
        ReconcileOutcome::Applied { remaining, .. } => {
          event!(Level::DEBUG, product_id = %outcome.product_id(), quantity = item.quantity, remaining, "Item applied.")
        }
        failed => event!(Level::WARN, product_id = %failed.product_id(), outcome = ?failed, "Item not applied."),
      }
      outcomes.push(outcome);
    }

    Ok(ReconcileReport {
      order_id: order.order_id.clone(),
      outcomes,
    })
  }

  async fn apply_item(&self, item: &OrderItem) -> Result<ReconcileOutcome, StoreError> {
    let max_attempts = match self.mode {
      ConcurrencyMode::Optimistic { max_attempts } => max_attempts.max(1),
      ConcurrencyMode::LastWriterWins => 1,
    };

    for attempt in 1..=max_attempts {
      let Some(entity) = self.store.get(PRODUCTS_TABLE, PRODUCTS_PARTITION, &item.product_id).await? else {
        return Ok(ReconcileOutcome::ProductNotFound {
          product_id: item.product_id.clone(),
        });
      };
      let mut product = ProductRecord::from_entity(entity)?;

      if product.quantity_in_stock < item.quantity {
        return Ok(ReconcileOutcome::InsufficientStock {
          product_id: item.product_id.clone(),
          requested: item.quantity,
          available: product.quantity_in_stock,
        });
      }
      product.quantity_in_stock -= item.quantity;

      let condition = match (self.mode, product.concurrency_token.clone()) {
        (ConcurrencyMode::Optimistic { .. }, Some(token)) => UpdateCondition::IfMatch(token),
        _ => UpdateCondition::Any,
      };

      match self.store.update(PRODUCTS_TABLE, product.to_entity()?, condition).await {
        Ok(_) => {
          return Ok(ReconcileOutcome::Applied {
            product_id: item.product_id.clone(),
            quantity: item.quantity,
            remaining: product.quantity_in_stock,
          })
        }
        Err(StoreError::ConcurrencyConflict { .. }) => {
          event!(Level::DEBUG, product_id = %item.product_id, attempt, max_attempts, "Stock update raced, re-reading.");
        }
        // Deleted between the read and the write.
        Err(StoreError::NotFound { .. }) => {
          return Ok(ReconcileOutcome::ProductNotFound {
            product_id: item.product_id.clone(),
          })
        }
        Err(e) => return Err(e),
      }
    }

    Ok(ReconcileOutcome::ConcurrencyConflict {
      product_id: item.product_id.clone(),
      attempts: max_attempts,
    })
  }
}
