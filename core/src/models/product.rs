// fulfillment/src/models/product.rs

use super::entity::{ConcurrencyToken, TableEntity};
use serde::{Deserialize, Serialize};

pub const PRODUCTS_TABLE: &str = "Products";
/// Every product row lives in this single partition.
pub const PRODUCTS_PARTITION: &str = "Products";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProductRecord {
  pub partition_key: String,
  /// The product identifier referenced by order items.
  pub row_key: String,
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub image_url: Option<String>,
  #[serde(default)]
  pub price_cents: i64,
  pub quantity_in_stock: u32,
  #[serde(skip)]
  pub concurrency_token: Option<ConcurrencyToken>,
}

impl ProductRecord {
  pub fn new(product_id: impl Into<String>, name: impl Into<String>, quantity_in_stock: u32) -> Self {
    Self {
      partition_key: PRODUCTS_PARTITION.to_string(),
      row_key: product_id.into(),
      name: name.into(),
      description: None,
      image_url: None,
      price_cents: 0,
      quantity_in_stock,
      concurrency_token: None,
    }
  }

  pub fn with_price_cents(mut self, price_cents: i64) -> Self {
    self.price_cents = price_cents;
    self
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  pub fn product_id(&self) -> &str {
    &self.row_key
  }
}

impl TableEntity for ProductRecord {
  const TABLE: &'static str = PRODUCTS_TABLE;

  fn partition_key(&self) -> &str {
    &self.partition_key
  }

  fn row_key(&self) -> &str {
    &self.row_key
  }

  fn concurrency_token(&self) -> Option<&ConcurrencyToken> {
    self.concurrency_token.as_ref()
  }

  fn set_concurrency_token(&mut self, token: Option<ConcurrencyToken>) {
    self.concurrency_token = token;
  }
}
