//! Tests for `GraphNode` slot synchronization.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::error::RunError;
use crate::node::{GraphNode, NodeBehavior};
use crate::params::{MapParameters, ParameterCollection};
use crate::progress::{CancelToken, Progress};
use crate::slot_config::SlotConfiguration;
use crate::sweep::ParameterSweepSettings;
use crate::types::{BatchInput, BatchOutput, DataRow, SlotDefinition, SlotKind};

#[derive(Clone)]
struct NoopBehavior {
  params: MapParameters,
}

impl NoopBehavior {
  fn new() -> Self {
    Self {
      params: MapParameters::new().with("threshold", json!(10)),
    }
  }
}

impl ParameterCollection for NoopBehavior {
  fn parameter_keys(&self) -> Vec<String> {
    self.params.parameter_keys()
  }

  fn parameter(&self, key: &str) -> Option<serde_json::Value> {
    self.params.parameter(key)
  }

  fn set_parameter(&mut self, key: &str, value: serde_json::Value) -> bool {
    self.params.set_parameter(key, value)
  }
}

#[async_trait]
impl NodeBehavior for NoopBehavior {
  async fn run_batch(
    &self,
    _input: &BatchInput,
    _output: &mut BatchOutput,
    _progress: &Progress,
    _cancel: &CancelToken,
  ) -> Result<(), RunError> {
    Ok(())
  }
}

fn node_with_inputs(names: &[&str]) -> GraphNode {
  let mut config = SlotConfiguration::new();
  for name in names {
    config
      .add_slot(SlotDefinition::input(*name, "image"))
      .expect("add input");
  }
  GraphNode::new("test.noop", "Noop", config, Box::new(NoopBehavior::new()))
}

#[test]
fn construction_materializes_configured_slots() {
  let node = node_with_inputs(&["A", "B"]);
  let names: Vec<&str> = node.input_slots().iter().map(|s| s.name()).collect();
  assert_eq!(names, vec!["A", "B"]);
  assert!(node.output_slots().is_empty());
}

#[test]
fn update_slots_without_change_is_stable() {
  let mut node = node_with_inputs(&["A", "B"]);
  node
    .input_slot_mut("A")
    .expect("slot A")
    .push_row(DataRow::new(Arc::new(1i64)));

  assert!(!node.update_slots());
  assert_eq!(node.input_slot("A").expect("slot A").row_count(), 1);
}

#[test]
fn added_definition_creates_instance() {
  let mut node = node_with_inputs(&["A"]);
  node
    .slot_configuration_mut()
    .add_slot(SlotDefinition::input("B", "image"))
    .expect("add");
  assert!(node.update_slots());
  assert!(node.input_slot("B").is_some());
}

#[test]
fn removed_definition_destroys_instance() {
  let mut node = node_with_inputs(&["A", "B"]);
  node
    .slot_configuration_mut()
    .remove_slot("A", SlotKind::Input)
    .expect("remove");
  assert!(node.update_slots());
  assert!(node.input_slot("A").is_none());
  assert_eq!(node.input_slots().len(), 1);
}

#[test]
fn changed_definition_replaces_instance_and_drops_rows() {
  let mut node = node_with_inputs(&["A"]);
  node
    .input_slot_mut("A")
    .expect("slot A")
    .push_row(DataRow::new(Arc::new(1i64)));
  node
    .slot_configuration_mut()
    .replace_slot(SlotDefinition::input("A", "mask"))
    .expect("replace");

  assert!(node.update_slots());
  let slot = node.input_slot("A").expect("slot A");
  assert_eq!(slot.definition().data_type.as_str(), "mask");
  assert!(slot.is_empty());
}

#[test]
fn reorder_follows_configuration_order() {
  let mut node = node_with_inputs(&["A", "B", "C"]);
  node
    .slot_configuration_mut()
    .set_slot_order(SlotKind::Input, &["C".to_string(), "A".to_string(), "B".to_string()]);
  assert!(node.update_slots());
  let names: Vec<&str> = node.input_slots().iter().map(|s| s.name()).collect();
  assert_eq!(names, vec!["C", "A", "B"]);
}

#[test]
fn reorder_preserves_rows() {
  let mut node = node_with_inputs(&["A", "B"]);
  node
    .input_slot_mut("B")
    .expect("slot B")
    .push_row(DataRow::new(Arc::new(7i64)));
  node
    .slot_configuration_mut()
    .set_slot_order(SlotKind::Input, &["B".to_string(), "A".to_string()]);
  node.update_slots();
  assert_eq!(node.input_slots()[0].name(), "B");
  assert_eq!(node.input_slots()[0].row_count(), 1);
}

#[test]
fn effective_input_slots_exclude_parameter_slot_when_sweep_enabled() {
  let mut node = node_with_inputs(&["A", "Parameters"]);
  assert_eq!(node.effective_input_slots().len(), 2);

  node.set_sweep_settings(ParameterSweepSettings {
    enabled: true,
    ..ParameterSweepSettings::default()
  });
  let effective: Vec<&str> = node
    .effective_input_slots()
    .iter()
    .map(|s| s.name())
    .collect();
  assert_eq!(effective, vec!["A"]);
}

#[test]
fn duplicate_gets_fresh_id_and_empty_slots() {
  let mut node = node_with_inputs(&["A"]);
  node
    .input_slot_mut("A")
    .expect("slot A")
    .push_row(DataRow::new(Arc::new(1i64)));
  node.set_custom_name(Some("renamed".to_string()));

  let copy = node.duplicate();
  assert_ne!(copy.id(), node.id());
  assert_eq!(copy.name(), "renamed");
  assert!(copy.input_slot("A").expect("slot A").is_empty());
  assert_eq!(node.input_slot("A").expect("slot A").row_count(), 1);
}

#[test]
fn name_falls_back_to_declaration_name() {
  let node = node_with_inputs(&[]);
  assert_eq!(node.name(), "Noop");
}
