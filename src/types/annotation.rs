//! Key/value tag attached to a data row.

use serde::{Deserialize, Serialize};

/// A named string value on a row, used for batch matching and provenance.
///
/// Names are unique per row; rows may lack a name entirely, which matching
/// treats as a wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Annotation {
  pub name: String,
  pub value: String,
}

impl Annotation {
  pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      value: value.into(),
    }
  }
}
