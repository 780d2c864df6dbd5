//! Flat key/value access to a node's parameters.
//!
//! The sweep runner snapshots, applies, and restores parameters only
//! through [ParameterCollection], so behaviors stay free to store their
//! configuration however they like. Nested parameter groups flatten into
//! dotted keys (e.g. `"smoothing.sigma"`).

use std::collections::BTreeMap;

/// Uniform accessor over a behavior's (possibly nested) parameter tree.
pub trait ParameterCollection {
  /// All parameter keys, in a stable order.
  fn parameter_keys(&self) -> Vec<String>;

  fn parameter(&self, key: &str) -> Option<serde_json::Value>;

  /// Sets a parameter. Returns false when the key is unknown.
  fn set_parameter(&mut self, key: &str, value: serde_json::Value) -> bool;

  /// Human-readable name for annotation tagging; defaults to the key
  /// itself.
  fn parameter_display_name(&self, key: &str) -> Option<String> {
    let _ = key;
    None
  }
}

/// Captures every current parameter value of a collection.
pub fn snapshot_parameters<C>(collection: &C) -> BTreeMap<String, serde_json::Value>
where
  C: ParameterCollection + ?Sized,
{
  let mut snapshot = BTreeMap::new();
  for key in collection.parameter_keys() {
    if let Some(value) = collection.parameter(&key) {
      snapshot.insert(key, value);
    }
  }
  snapshot
}

/// Map-backed [ParameterCollection] with optional display names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapParameters {
  values: BTreeMap<String, serde_json::Value>,
  display_names: BTreeMap<String, String>,
}

impl MapParameters {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
    self.values.insert(key.into(), value);
    self
  }

  pub fn with_display_name(
    mut self,
    key: impl Into<String>,
    display_name: impl Into<String>,
  ) -> Self {
    self.display_names.insert(key.into(), display_name.into());
    self
  }
}

impl ParameterCollection for MapParameters {
  fn parameter_keys(&self) -> Vec<String> {
    self.values.keys().cloned().collect()
  }

  fn parameter(&self, key: &str) -> Option<serde_json::Value> {
    self.values.get(key).cloned()
  }

  fn set_parameter(&mut self, key: &str, value: serde_json::Value) -> bool {
    match self.values.get_mut(key) {
      Some(existing) => {
        *existing = value;
        true
      }
      None => false,
    }
  }

  fn parameter_display_name(&self, key: &str) -> Option<String> {
    self.display_names.get(key).cloned()
  }
}
