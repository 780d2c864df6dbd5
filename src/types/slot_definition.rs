//! Declarative description of a node's input or output port.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::data_type::DataTypeId;

/// Direction of a slot on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotKind {
  Input,
  Output,
}

impl std::fmt::Display for SlotKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      SlotKind::Input => f.write_str("input"),
      SlotKind::Output => f.write_str("output"),
    }
  }
}

/// Name by which an output slot inherits from the node's first input slot.
pub const INHERIT_FIRST_INPUT: &str = "*";

/// Declares a named, typed slot.
///
/// An output slot may inherit its concrete type from one of the node's input
/// slots (`inherited_from`), resolved lazily and transitively through the
/// graph. `"*"` refers to the node's first input slot. The optional
/// conversion map rewrites the inherited type after resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDefinition {
  pub name: String,
  pub data_type: DataTypeId,
  pub kind: SlotKind,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub inherited_from: Option<String>,
  #[serde(default, skip_serializing_if = "HashMap::is_empty")]
  pub inheritance_conversions: HashMap<DataTypeId, DataTypeId>,
}

impl SlotDefinition {
  pub fn input(name: impl Into<String>, data_type: impl Into<DataTypeId>) -> Self {
    Self {
      name: name.into(),
      data_type: data_type.into(),
      kind: SlotKind::Input,
      inherited_from: None,
      inheritance_conversions: HashMap::new(),
    }
  }

  pub fn output(name: impl Into<String>, data_type: impl Into<DataTypeId>) -> Self {
    Self {
      name: name.into(),
      data_type: data_type.into(),
      kind: SlotKind::Output,
      inherited_from: None,
      inheritance_conversions: HashMap::new(),
    }
  }

  /// Declares this output slot as inheriting from the named input slot
  /// (or [INHERIT_FIRST_INPUT] for the first input).
  pub fn inherited_from(mut self, input_slot: impl Into<String>) -> Self {
    self.inherited_from = Some(input_slot.into());
    self
  }

  /// Adds a type-conversion rule applied after inheritance resolution.
  pub fn with_conversion(
    mut self,
    from: impl Into<DataTypeId>,
    to: impl Into<DataTypeId>,
  ) -> Self {
    self.inheritance_conversions.insert(from.into(), to.into());
    self
  }

  /// Applies the conversion map to a resolved source type (identity when no
  /// rule matches).
  pub fn convert_inherited(&self, source: &DataTypeId) -> DataTypeId {
    self
      .inheritance_conversions
      .get(source)
      .cloned()
      .unwrap_or_else(|| source.clone())
  }
}
