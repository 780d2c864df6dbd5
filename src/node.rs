//! A graph node: slot configuration, live slots, and execution behavior.

use std::collections::HashSet;

use async_trait::async_trait;
use dyn_clone::DynClone;
use tracing::debug;

use crate::batch_gen::BatchGenerationSettings;
use crate::error::RunError;
use crate::params::ParameterCollection;
use crate::progress::{CancelToken, Progress};
use crate::slot_config::SlotConfiguration;
use crate::sweep::ParameterSweepSettings;
use crate::types::{BatchInput, BatchOutput, DataSlot, NodeId, SlotKind};

/// The algorithm executed once per (batch, parameter context) unit.
///
/// Behaviors are cloneable so the parallel sweep path can give every unit
/// its own isolated copy, parameters included.
#[async_trait]
pub trait NodeBehavior: ParameterCollection + DynClone + Send + Sync {
  /// Whether independent units of this behavior may run concurrently.
  fn supports_parallelization(&self) -> bool {
    false
  }

  /// Annotation names excluded from the batch-matching reference set.
  fn ignored_annotation_columns(&self) -> HashSet<String> {
    HashSet::new()
  }

  async fn run_batch(
    &self,
    input: &BatchInput,
    output: &mut BatchOutput,
    progress: &Progress,
    cancel: &CancelToken,
  ) -> Result<(), RunError>;
}

dyn_clone::clone_trait_object!(NodeBehavior);

/// A node in the pipeline graph.
///
/// `input_slots`/`output_slots` are always the materialization of
/// `slot_configuration` in declared order; [GraphNode::update_slots] is the
/// synchronization pass that restores that invariant after configuration
/// changes.
pub struct GraphNode {
  id: NodeId,
  declaration_id: String,
  declaration_name: String,
  custom_name: Option<String>,
  custom_description: Option<String>,
  slot_configuration: SlotConfiguration,
  input_slots: Vec<DataSlot>,
  output_slots: Vec<DataSlot>,
  behavior: Box<dyn NodeBehavior>,
  batch_settings: BatchGenerationSettings,
  sweep_settings: ParameterSweepSettings,
}

impl GraphNode {
  pub fn new(
    declaration_id: impl Into<String>,
    declaration_name: impl Into<String>,
    slot_configuration: SlotConfiguration,
    behavior: Box<dyn NodeBehavior>,
  ) -> Self {
    let mut node = Self {
      id: NodeId::new(),
      declaration_id: declaration_id.into(),
      declaration_name: declaration_name.into(),
      custom_name: None,
      custom_description: None,
      slot_configuration,
      input_slots: Vec::new(),
      output_slots: Vec::new(),
      behavior,
      batch_settings: BatchGenerationSettings::default(),
      sweep_settings: ParameterSweepSettings::default(),
    };
    node.update_slots();
    node
  }

  pub fn id(&self) -> NodeId {
    self.id
  }

  pub fn declaration_id(&self) -> &str {
    &self.declaration_id
  }

  /// Custom name when set, declaration name otherwise.
  pub fn name(&self) -> &str {
    self
      .custom_name
      .as_deref()
      .unwrap_or(&self.declaration_name)
  }

  pub fn set_custom_name(&mut self, name: Option<String>) {
    self.custom_name = name;
  }

  pub fn description(&self) -> Option<&str> {
    self.custom_description.as_deref()
  }

  pub fn set_custom_description(&mut self, description: Option<String>) {
    self.custom_description = description;
  }

  pub fn slot_configuration(&self) -> &SlotConfiguration {
    &self.slot_configuration
  }

  /// Mutable access to the configuration. Callers must follow up with
  /// [GraphNode::update_slots] (or let the graph's propagation do it).
  pub fn slot_configuration_mut(&mut self) -> &mut SlotConfiguration {
    &mut self.slot_configuration
  }

  pub fn behavior(&self) -> &(dyn NodeBehavior + 'static) {
    self.behavior.as_ref()
  }

  pub fn behavior_mut(&mut self) -> &mut Box<dyn NodeBehavior> {
    &mut self.behavior
  }

  pub fn batch_settings(&self) -> &BatchGenerationSettings {
    &self.batch_settings
  }

  pub fn set_batch_settings(&mut self, settings: BatchGenerationSettings) {
    self.batch_settings = settings;
  }

  pub fn sweep_settings(&self) -> &ParameterSweepSettings {
    &self.sweep_settings
  }

  pub fn set_sweep_settings(&mut self, settings: ParameterSweepSettings) {
    self.sweep_settings = settings;
  }

  pub fn input_slots(&self) -> &[DataSlot] {
    &self.input_slots
  }

  pub fn output_slots(&self) -> &[DataSlot] {
    &self.output_slots
  }

  pub fn input_slot(&self, name: &str) -> Option<&DataSlot> {
    self.input_slots.iter().find(|s| s.name() == name)
  }

  pub fn input_slot_mut(&mut self, name: &str) -> Option<&mut DataSlot> {
    self.input_slots.iter_mut().find(|s| s.name() == name)
  }

  pub fn output_slot(&self, name: &str) -> Option<&DataSlot> {
    self.output_slots.iter().find(|s| s.name() == name)
  }

  pub fn output_slot_mut(&mut self, name: &str) -> Option<&mut DataSlot> {
    self.output_slots.iter_mut().find(|s| s.name() == name)
  }

  /// Input slots that take part in batch matching: all inputs except the
  /// parameter slot when the sweep is enabled.
  pub fn effective_input_slots(&self) -> Vec<&DataSlot> {
    self
      .input_slots
      .iter()
      .filter(|s| !(self.sweep_settings.enabled && s.name() == self.sweep_settings.slot_name))
      .collect()
  }

  /// Reconciles live slots against the configuration. Returns whether
  /// anything changed; the caller re-resolves output inheritance when it
  /// did.
  ///
  /// Replacing a slot whose definition changed discards its rows.
  pub fn update_slots(&mut self) -> bool {
    let input_changed = sync_slots(
      &mut self.input_slots,
      &self.slot_configuration,
      SlotKind::Input,
    );
    let output_changed = sync_slots(
      &mut self.output_slots,
      &self.slot_configuration,
      SlotKind::Output,
    );
    let changed = input_changed || output_changed;
    if changed {
      debug!(node = %self.name(), "slots synchronized");
    }
    changed
  }

  /// A copy of this node with a fresh id and empty slots.
  pub fn duplicate(&self) -> Self {
    let mut copy = Self {
      id: NodeId::new(),
      declaration_id: self.declaration_id.clone(),
      declaration_name: self.declaration_name.clone(),
      custom_name: self.custom_name.clone(),
      custom_description: self.custom_description.clone(),
      slot_configuration: self.slot_configuration.clone(),
      input_slots: Vec::new(),
      output_slots: Vec::new(),
      behavior: self.behavior.clone(),
      batch_settings: self.batch_settings.clone(),
      sweep_settings: self.sweep_settings.clone(),
    };
    copy.update_slots();
    copy
  }
}

impl std::fmt::Debug for GraphNode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("GraphNode")
      .field("id", &self.id)
      .field("declaration_id", &self.declaration_id)
      .field("name", &self.name())
      .field("inputs", &self.input_slots.len())
      .field("outputs", &self.output_slots.len())
      .finish_non_exhaustive()
  }
}

/// Three-pass reconciliation of one direction's slot instances.
fn sync_slots(
  slots: &mut Vec<DataSlot>,
  configuration: &SlotConfiguration,
  kind: SlotKind,
) -> bool {
  let mut changed = false;

  // Pass 1: add missing instances, replace instances whose definition
  // differs from the configuration (rows are lost on replace).
  for definition in configuration.ordered_slots(kind) {
    match slots.iter_mut().find(|s| s.name() == definition.name) {
      Some(existing) => {
        if existing.definition() != definition {
          *existing = DataSlot::new(definition.clone());
          changed = true;
        }
      }
      None => {
        slots.push(DataSlot::new(definition.clone()));
        changed = true;
      }
    }
  }

  // Pass 2: drop instances no longer declared.
  let before = slots.len();
  slots.retain(|s| configuration.has_slot(s.name(), kind));
  if slots.len() != before {
    changed = true;
  }

  // Pass 3: reorder to the declared order; instances missing from the
  // order list keep their relative position at the end.
  let previous_order: Vec<String> = slots.iter().map(|s| s.name().to_string()).collect();
  let order = configuration.slot_order(kind);
  let mut reordered: Vec<DataSlot> = Vec::with_capacity(slots.len());
  for name in order {
    if let Some(index) = slots.iter().position(|s| s.name() == name) {
      reordered.push(slots.remove(index));
    }
  }
  reordered.append(slots);
  if reordered
    .iter()
    .map(|s| s.name())
    .ne(previous_order.iter().map(String::as_str))
  {
    changed = true;
  }
  *slots = reordered;

  changed
}
