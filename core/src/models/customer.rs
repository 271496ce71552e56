// fulfillment/src/models/customer.rs

use super::entity::{ConcurrencyToken, TableEntity};
use serde::{Deserialize, Serialize};

pub const CUSTOMERS_TABLE: &str = "Customers";
pub const CUSTOMERS_PARTITION: &str = "Customers";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomerRecord {
  pub partition_key: String,
  pub row_key: String,
  pub name: String,
  pub email: String,
  #[serde(default)]
  pub address: Option<String>,
  #[serde(default)]
  pub phone_number: Option<String>,
  #[serde(default)]
  pub profile_picture_url: Option<String>,
  #[serde(default, rename = "UploadPDFUrl")]
  pub upload_pdf_url: Option<String>,
  #[serde(skip)]
  pub concurrency_token: Option<ConcurrencyToken>,
}

impl CustomerRecord {
  pub fn new(customer_id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
    Self {
      partition_key: CUSTOMERS_PARTITION.to_string(),
      row_key: customer_id.into(),
      name: name.into(),
      email: email.into(),
      address: None,
      phone_number: None,
      profile_picture_url: None,
      upload_pdf_url: None,
      concurrency_token: None,
    }
  }
}

impl TableEntity for CustomerRecord {
  const TABLE: &'static str = CUSTOMERS_TABLE;

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
