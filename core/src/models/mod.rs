// fulfillment/src/models/mod.rs

//! Data structures for orders on the wire and records in the entity store.

pub mod customer;
pub mod entity;
pub mod order;
pub mod product;

pub use customer::{CustomerRecord, CUSTOMERS_PARTITION, CUSTOMERS_TABLE};
pub use entity::{ConcurrencyToken, Entity, TableEntity, UpdateCondition};
pub use order::{Order, OrderItem};
pub use product::{ProductRecord, PRODUCTS_PARTITION, PRODUCTS_TABLE};
