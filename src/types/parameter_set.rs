//! One row of the auxiliary "Parameters" slot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A flat key -> value override map applied to a node for one sweep
/// iteration, then reverted. Never persisted beyond the slot rows
/// themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
  values: BTreeMap<String, serde_json::Value>,
}

impl ParameterSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
    self.values.insert(key.into(), value);
    self
  }

  pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
    self.values.get(key)
  }

  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.values.keys().map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
    self.values.iter().map(|(k, v)| (k.as_str(), v))
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }
}

impl From<BTreeMap<String, serde_json::Value>> for ParameterSet {
  fn from(values: BTreeMap<String, serde_json::Value>) -> Self {
    Self { values }
  }
}
