//! Declarative slot configuration of a node.
//!
//! A [SlotConfiguration] is the single source of truth for which slots a
//! node has; [crate::node::GraphNode::update_slots] materializes it into
//! live [crate::types::DataSlot] instances. Mutations report an explicit
//! `changed` flag instead of firing events.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::types::{DataTypeId, SlotDefinition, SlotKind};

/// Per-direction cap on slot count.
pub const DEFAULT_MAX_SLOTS: usize = 32;

/// Ordered input/output slot declarations with mutation policy.
///
/// Each direction can be sealed against adding or removing slots and can
/// carry an allowlist of data types; both are enforced on mutation, not on
/// construction through the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotConfiguration {
  input_slots: HashMap<String, SlotDefinition>,
  output_slots: HashMap<String, SlotDefinition>,
  input_order: Vec<String>,
  output_order: Vec<String>,
  allow_input_add: bool,
  allow_input_remove: bool,
  allow_output_add: bool,
  allow_output_remove: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  allowed_input_types: Option<HashSet<DataTypeId>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  allowed_output_types: Option<HashSet<DataTypeId>>,
  max_slots: usize,
}

impl Default for SlotConfiguration {
  fn default() -> Self {
    Self {
      input_slots: HashMap::new(),
      output_slots: HashMap::new(),
      input_order: Vec::new(),
      output_order: Vec::new(),
      allow_input_add: true,
      allow_input_remove: true,
      allow_output_add: true,
      allow_output_remove: true,
      allowed_input_types: None,
      allowed_output_types: None,
      max_slots: DEFAULT_MAX_SLOTS,
    }
  }
}

impl SlotConfiguration {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn builder() -> SlotConfigurationBuilder {
    SlotConfigurationBuilder {
      config: Self::new(),
    }
  }

  /// Adds a slot. `Ok(true)` when the configuration changed.
  pub fn add_slot(&mut self, definition: SlotDefinition) -> Result<bool, GraphError> {
    let kind = definition.kind;
    if !self.allows_add(kind) {
      return Err(GraphError::SlotSealed {
        operation: "adding".to_string(),
        kind: kind.to_string(),
      });
    }
    if let Some(allowed) = self.allowed_types(kind) {
      if !allowed.contains(&definition.data_type) {
        return Err(GraphError::TypeNotAllowed {
          data_type: definition.data_type.to_string(),
          kind: kind.to_string(),
        });
      }
    }
    if self.slots(kind).contains_key(&definition.name) {
      return Err(GraphError::SlotAlreadyExists {
        slot: definition.name,
        kind: kind.to_string(),
      });
    }
    if self.slots(kind).len() >= self.max_slots {
      return Err(GraphError::SlotLimitReached {
        slot: definition.name,
        kind: kind.to_string(),
        limit: self.max_slots,
      });
    }
    let name = definition.name.clone();
    self.order_mut(kind).push(name.clone());
    self.slots_mut(kind).insert(name, definition);
    Ok(true)
  }

  /// Removes a slot. `Ok(false)` when no such slot exists.
  pub fn remove_slot(&mut self, name: &str, kind: SlotKind) -> Result<bool, GraphError> {
    if !self.allows_remove(kind) {
      return Err(GraphError::SlotSealed {
        operation: "removing".to_string(),
        kind: kind.to_string(),
      });
    }
    if self.slots_mut(kind).remove(name).is_none() {
      return Ok(false);
    }
    self.order_mut(kind).retain(|n| n != name);
    Ok(true)
  }

  /// Replaces an existing slot's definition in place, keeping its position.
  /// `Ok(false)` when the new definition equals the old one.
  pub fn replace_slot(&mut self, definition: SlotDefinition) -> Result<bool, GraphError> {
    let kind = definition.kind;
    let name = definition.name.clone();
    match self.slots_mut(kind).get_mut(&name) {
      Some(existing) => {
        if *existing == definition {
          Ok(false)
        } else {
          *existing = definition;
          Ok(true)
        }
      }
      None => Err(GraphError::UnknownSlot {
        slot: name,
        kind: kind.to_string(),
      }),
    }
  }

  pub fn slot(&self, name: &str, kind: SlotKind) -> Option<&SlotDefinition> {
    self.slots(kind).get(name)
  }

  pub fn has_slot(&self, name: &str, kind: SlotKind) -> bool {
    self.slots(kind).contains_key(name)
  }

  /// Slot definitions in declared order.
  pub fn ordered_slots(&self, kind: SlotKind) -> Vec<&SlotDefinition> {
    self
      .order(kind)
      .iter()
      .filter_map(|name| self.slots(kind).get(name))
      .collect()
  }

  pub fn slot_order(&self, kind: SlotKind) -> &[String] {
    self.order(kind)
  }

  pub fn slot_count(&self, kind: SlotKind) -> usize {
    self.slots(kind).len()
  }

  pub fn first_input_name(&self) -> Option<&str> {
    self.input_order.first().map(String::as_str)
  }

  /// Reorders slots to match `names`; unknown names are ignored and slots
  /// missing from `names` keep their relative position at the end. Returns
  /// whether the order changed.
  pub fn set_slot_order(&mut self, kind: SlotKind, names: &[String]) -> bool {
    let mut new_order: Vec<String> = names
      .iter()
      .filter(|n| self.slots(kind).contains_key(*n))
      .cloned()
      .collect();
    for name in self.order(kind) {
      if !new_order.contains(name) {
        new_order.push(name.clone());
      }
    }
    if new_order == *self.order(kind) {
      return false;
    }
    *self.order_mut(kind) = new_order;
    true
  }

  /// Moves a slot one position towards the front. Returns whether anything
  /// moved.
  pub fn move_up(&mut self, name: &str, kind: SlotKind) -> bool {
    let order = self.order_mut(kind);
    match order.iter().position(|n| n == name) {
      Some(index) if index > 0 => {
        order.swap(index, index - 1);
        true
      }
      _ => false,
    }
  }

  /// Moves a slot one position towards the back. Returns whether anything
  /// moved.
  pub fn move_down(&mut self, name: &str, kind: SlotKind) -> bool {
    let order = self.order_mut(kind);
    match order.iter().position(|n| n == name) {
      Some(index) if index + 1 < order.len() => {
        order.swap(index, index + 1);
        true
      }
      _ => false,
    }
  }

  fn allows_add(&self, kind: SlotKind) -> bool {
    match kind {
      SlotKind::Input => self.allow_input_add,
      SlotKind::Output => self.allow_output_add,
    }
  }

  fn allows_remove(&self, kind: SlotKind) -> bool {
    match kind {
      SlotKind::Input => self.allow_input_remove,
      SlotKind::Output => self.allow_output_remove,
    }
  }

  fn allowed_types(&self, kind: SlotKind) -> Option<&HashSet<DataTypeId>> {
    match kind {
      SlotKind::Input => self.allowed_input_types.as_ref(),
      SlotKind::Output => self.allowed_output_types.as_ref(),
    }
  }

  fn slots(&self, kind: SlotKind) -> &HashMap<String, SlotDefinition> {
    match kind {
      SlotKind::Input => &self.input_slots,
      SlotKind::Output => &self.output_slots,
    }
  }

  fn slots_mut(&mut self, kind: SlotKind) -> &mut HashMap<String, SlotDefinition> {
    match kind {
      SlotKind::Input => &mut self.input_slots,
      SlotKind::Output => &mut self.output_slots,
    }
  }

  fn order(&self, kind: SlotKind) -> &Vec<String> {
    match kind {
      SlotKind::Input => &self.input_order,
      SlotKind::Output => &self.output_order,
    }
  }

  fn order_mut(&mut self, kind: SlotKind) -> &mut Vec<String> {
    match kind {
      SlotKind::Input => &mut self.input_order,
      SlotKind::Output => &mut self.output_order,
    }
  }
}

/// Assembles fixed configurations for node declarations.
#[derive(Debug, Clone)]
pub struct SlotConfigurationBuilder {
  config: SlotConfiguration,
}

impl SlotConfigurationBuilder {
  pub fn add_input(self, name: impl Into<String>, data_type: impl Into<DataTypeId>) -> Self {
    self.add_slot(SlotDefinition::input(name, data_type))
  }

  pub fn add_output(self, name: impl Into<String>, data_type: impl Into<DataTypeId>) -> Self {
    self.add_slot(SlotDefinition::output(name, data_type))
  }

  /// Adds a prepared definition; duplicate names replace the earlier
  /// definition.
  pub fn add_slot(mut self, definition: SlotDefinition) -> Self {
    let kind = definition.kind;
    let name = definition.name.clone();
    if self.config.has_slot(&name, kind) {
      self.config.slots_mut(kind).insert(name, definition);
    } else {
      self.config.order_mut(kind).push(name.clone());
      self.config.slots_mut(kind).insert(name, definition);
    }
    self
  }

  pub fn restrict_input_types(
    mut self,
    types: impl IntoIterator<Item = DataTypeId>,
  ) -> Self {
    self.config.allowed_input_types = Some(types.into_iter().collect());
    self
  }

  pub fn restrict_output_types(
    mut self,
    types: impl IntoIterator<Item = DataTypeId>,
  ) -> Self {
    self.config.allowed_output_types = Some(types.into_iter().collect());
    self
  }

  pub fn max_slots(mut self, limit: usize) -> Self {
    self.config.max_slots = limit;
    self
  }

  /// Seals both directions against adding and removing slots.
  pub fn seal(mut self) -> Self {
    self.config.allow_input_add = false;
    self.config.allow_input_remove = false;
    self.config.allow_output_add = false;
    self.config.allow_output_remove = false;
    self
  }

  pub fn seal_inputs(mut self) -> Self {
    self.config.allow_input_add = false;
    self.config.allow_input_remove = false;
    self
  }

  pub fn seal_outputs(mut self) -> Self {
    self.config.allow_output_add = false;
    self.config.allow_output_remove = false;
    self
  }

  pub fn build(self) -> SlotConfiguration {
    self.config
  }
}
