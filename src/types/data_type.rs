//! Identifier for a data type flowing through slots.

use serde::{Deserialize, Serialize};

/// Identifier of a data type, e.g. `"image.grayscale"` or `"table"`.
///
/// The engine treats types as opaque identifiers; compatibility rules live
/// with the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataTypeId(String);

impl DataTypeId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for DataTypeId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for DataTypeId {
  fn from(id: &str) -> Self {
    Self(id.to_string())
  }
}

impl From<String> for DataTypeId {
  fn from(id: String) -> Self {
    Self(id)
  }
}
