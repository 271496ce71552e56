// fulfillment/src/store/memory.rs

//! In-process `EntityStore` used by the demo binary and by tests.
//!
//! All state sits behind one `parking_lot::RwLock`; no guard is held across an
//! `.await`, so each call is atomic with respect to every other call.
//!
//! ## Limitations
//!
//! - No persistence: rows live as long as the value does
//! - `scan` snapshots the matching rows under the read lock and streams the copy, so
//!   it is not lazy against the backing map and does not see writes made mid-scan

use super::{EntityStore, EntityStream};
use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use crate::models::{ConcurrencyToken, Entity, UpdateCondition};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{event, Level};

type RowKey = (String, String);

#[derive(Debug, Clone)]
struct StoredRow {
  properties: Map<String, Value>,
  token: ConcurrencyToken,
  timestamp: DateTime<Utc>,
}

#[derive(Debug)]
pub struct InMemoryEntityStore {
  tables: RwLock<HashMap<String, HashMap<RowKey, StoredRow>>>,
  next_version: AtomicU64,
  available: AtomicBool,
  clock: Arc<dyn Clock>,
}

impl Default for InMemoryEntityStore {
  fn default() -> Self {
    Self::new()
  }
}

impl InMemoryEntityStore {
  pub fn new() -> Self {
    Self::with_clock(Arc::new(SystemClock))
  }

  pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
    Self {
      tables: RwLock::new(HashMap::new()),
      next_version: AtomicU64::new(1),
      available: AtomicBool::new(true),
      clock,
    }
  }

  /// Simulates an outage: while unavailable every call fails with `StoreError::Unavailable`.
  pub fn set_available(&self, available: bool) {
    self.available.store(available, Ordering::SeqCst);
  }

  fn ensure_available(&self) -> Result<(), StoreError> {
    if self.available.load(Ordering::SeqCst) {
      Ok(())
    } else {
      Err(StoreError::Unavailable {
        message: "in-memory store is marked unavailable".to_string(),
      })
    }
  }

  fn issue_token(&self) -> ConcurrencyToken {
    let version = self.next_version.fetch_add(1, Ordering::SeqCst);
    ConcurrencyToken::new(format!("W/\"{}\"", version))
  }

  fn to_entity(key: &RowKey, row: &StoredRow) -> Entity {
    Entity {
      partition_key: key.0.clone(),
      row_key: key.1.clone(),
      properties: row.properties.clone(),
      token: Some(row.token.clone()),
      timestamp: Some(row.timestamp),
    }
  }
}

fn table_not_found(table: &str) -> StoreError {
  StoreError::TableNotFound {
    table: table.to_string(),
  }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
  async fn create_table_if_not_exists(&self, table: &str) -> Result<(), StoreError> {
    self.ensure_available()?;
    let mut tables = self.tables.write();
    if !tables.contains_key(table) {
      tables.insert(table.to_string(), HashMap::new());
      event!(Level::DEBUG, %table, "Table created.");
    }
    Ok(())
  }

  async fn get(&self, table: &str, partition_key: &str, row_key: &str) -> Result<Option<Entity>, StoreError> {
    self.ensure_available()?;
    let tables = self.tables.read();
    let rows = tables.get(table).ok_or_else(|| table_not_found(table))?;
    let key = (partition_key.to_string(), row_key.to_string());
    Ok(rows.get(&key).map(|row| Self::to_entity(&key, row)))
  }

  async fn add(&self, table: &str, entity: Entity) -> Result<ConcurrencyToken, StoreError> {
    self.ensure_available()?;
    let mut tables = self.tables.write();
    let rows = tables.get_mut(table).ok_or_else(|| table_not_found(table))?;
    let key = (entity.partition_key, entity.row_key);
    if rows.contains_key(&key) {
      return Err(StoreError::AlreadyExists {
        table: table.to_string(),
        partition_key: key.0,
        row_key: key.1,
      });
    }

    let token = self.issue_token();
    rows.insert(
      key,
      StoredRow {
        properties: entity.properties,
        token: token.clone(),
        timestamp: self.clock.now(),
      },
    );
    Ok(token)
  }

  async fn update(
    &self,
    table: &str,
    entity: Entity,
    condition: UpdateCondition,
  ) -> Result<ConcurrencyToken, StoreError> {
    self.ensure_available()?;
    let mut tables = self.tables.write();
    let rows = tables.get_mut(table).ok_or_else(|| table_not_found(table))?;
    let key = (entity.partition_key, entity.row_key);

    let Some(current) = rows.get(&key) else {
      return Err(StoreError::NotFound {
        table: table.to_string(),
        partition_key: key.0,
        row_key: key.1,
      });
    };

    if let UpdateCondition::IfMatch(expected) = &condition {
      if *expected != current.token {
        event!(Level::DEBUG, %table, partition_key = %key.0, row_key = %key.1, expected = %expected, stored = %current.token, "Conditional update rejected.");
        return Err(StoreError::ConcurrencyConflict {
          table: table.to_string(),
          partition_key: key.0,
          row_key: key.1,
        });
      }
    }

    let token = self.issue_token();
    rows.insert(
      key,
      StoredRow {
        properties: entity.properties,
        token: token.clone(),
        timestamp: self.clock.now(),
      },
    );
    Ok(token)
  }

  async fn delete(&self, table: &str, partition_key: &str, row_key: &str) -> Result<(), StoreError> {
    self.ensure_available()?;
    let mut tables = self.tables.write();
    let rows = tables.get_mut(table).ok_or_else(|| table_not_found(table))?;
    rows.remove(&(partition_key.to_string(), row_key.to_string()));
    Ok(())
  }

  fn scan<'a>(&'a self, table: &'a str, partition_key: Option<&'a str>) -> EntityStream<'a> {
    if let Err(e) = self.ensure_available() {
      return stream::iter(vec![Err(e)]).boxed();
    }

    let snapshot: Vec<Result<Entity, StoreError>> = {
      let tables = self.tables.read();
      match tables.get(table) {
        Some(rows) => rows
          .iter()
          .filter(|(key, _)| partition_key.map_or(true, |pk| key.0 == pk))
          .map(|(key, row)| Ok(Self::to_entity(key, row)))
          .collect(),
        None => vec![Err(table_not_found(table))],
      }
    };
    stream::iter(snapshot).boxed()
  }
}
