// fulfillment/src/models/entity.rs

//! The untyped row shape exchanged with an `EntityStore`, and the `TableEntity`
//! mapping that typed records implement on top of it.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

const PARTITION_KEY_FIELD: &str = "PartitionKey";
const ROW_KEY_FIELD: &str = "RowKey";

/// Opaque version marker handed out by the store on every successful write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConcurrencyToken(String);

impl ConcurrencyToken {
  pub fn new(value: impl Into<String>) -> Self {
    Self(value.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for ConcurrencyToken {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Precondition attached to an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateCondition {
  /// Overwrite whatever is stored (last writer wins).
  Any,
  /// Only write if the stored token still matches.
  IfMatch(ConcurrencyToken),
}

/// A row addressed by `(partition_key, row_key)` with free-form properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
  pub partition_key: String,
  pub row_key: String,
  pub properties: Map<String, Value>,
  /// Set by the store on reads; ignored on writes (use `UpdateCondition`).
  pub token: Option<ConcurrencyToken>,
  pub timestamp: Option<DateTime<Utc>>,
}

impl Entity {
  pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
    Self {
      partition_key: partition_key.into(),
      row_key: row_key.into(),
      properties: Map::new(),
      token: None,
      timestamp: None,
    }
  }

  pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
    self.properties.insert(name.into(), value.into());
    self
  }
}

/// A typed record stored in one logical table.
///
/// Records serialize with their keys under `PartitionKey` / `RowKey`; every other
/// serialized field becomes an entity property. The concurrency token travels
/// outside the serialized form.
pub trait TableEntity: Serialize + DeserializeOwned + Send + Sync + Sized {
  const TABLE: &'static str;

  fn partition_key(&self) -> &str;
  fn row_key(&self) -> &str;
  fn concurrency_token(&self) -> Option<&ConcurrencyToken>;
  fn set_concurrency_token(&mut self, token: Option<ConcurrencyToken>);

  fn to_entity(&self) -> Result<Entity, StoreError> {
    let mut properties = match serde_json::to_value(self).map_err(|e| mapping_error::<Self>(e.to_string()))? {
      Value::Object(map) => map,
      other => return Err(mapping_error::<Self>(format!("expected an object, got {}", other))),
    };
    properties.remove(PARTITION_KEY_FIELD);
    properties.remove(ROW_KEY_FIELD);

    Ok(Entity {
      partition_key: self.partition_key().to_string(),
      row_key: self.row_key().to_string(),
      properties,
      token: self.concurrency_token().cloned(),
      timestamp: None,
    })
  }

  fn from_entity(entity: Entity) -> Result<Self, StoreError> {
    let Entity {
      partition_key,
      row_key,
      mut properties,
      token,
      ..
    } = entity;
    properties.insert(PARTITION_KEY_FIELD.to_string(), Value::String(partition_key));
    properties.insert(ROW_KEY_FIELD.to_string(), Value::String(row_key));

    let mut record: Self =
      serde_json::from_value(Value::Object(properties)).map_err(|e| mapping_error::<Self>(e.to_string()))?;
    record.set_concurrency_token(token);
    Ok(record)
  }
}

fn mapping_error<T: TableEntity>(message: String) -> StoreError {
  StoreError::Mapping {
    table: T::TABLE.to_string(),
    message,
  }
}
