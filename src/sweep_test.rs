//! Tests for the parameter sweep execution paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::error::RunError;
use crate::node::{GraphNode, NodeBehavior};
use crate::params::{MapParameters, ParameterCollection};
use crate::progress::{CancelToken, Progress};
use crate::slot_config::SlotConfiguration;
use crate::sweep::{run_batches, ParameterSweepSettings};
use crate::types::{
  BatchInput, BatchOutput, DataBatch, DataRow, ParameterSet, SlotDefinition,
};

#[derive(Clone)]
struct EchoBehavior {
  params: MapParameters,
  parallel: bool,
  fail_on: Option<i64>,
}

impl EchoBehavior {
  fn new() -> Self {
    Self {
      params: MapParameters::new()
        .with("threshold", json!(10))
        .with_display_name("threshold", "Threshold"),
      parallel: false,
      fail_on: None,
    }
  }

  fn parallel(mut self) -> Self {
    self.parallel = true;
    self
  }

  fn failing_on(mut self, threshold: i64) -> Self {
    self.fail_on = Some(threshold);
    self
  }

  fn threshold(&self) -> i64 {
    self
      .params
      .parameter("threshold")
      .and_then(|v| v.as_i64())
      .unwrap_or_default()
  }
}

impl ParameterCollection for EchoBehavior {
  fn parameter_keys(&self) -> Vec<String> {
    self.params.parameter_keys()
  }

  fn parameter(&self, key: &str) -> Option<serde_json::Value> {
    self.params.parameter(key)
  }

  fn set_parameter(&mut self, key: &str, value: serde_json::Value) -> bool {
    self.params.set_parameter(key, value)
  }

  fn parameter_display_name(&self, key: &str) -> Option<String> {
    self.params.parameter_display_name(key)
  }
}

#[async_trait]
impl NodeBehavior for EchoBehavior {
  fn supports_parallelization(&self) -> bool {
    self.parallel
  }

  async fn run_batch(
    &self,
    _input: &BatchInput,
    output: &mut BatchOutput,
    _progress: &Progress,
    _cancel: &CancelToken,
  ) -> Result<(), RunError> {
    let threshold = self.threshold();
    if self.fail_on == Some(threshold) {
      return Err(RunError::Execution {
        node: "Echo".to_string(),
        message: "forced failure".to_string(),
      });
    }
    output.push_data("Out", Arc::new(threshold), Vec::new());
    Ok(())
  }
}

fn sweep_node(behavior: EchoBehavior) -> GraphNode {
  let mut config = SlotConfiguration::new();
  config
    .add_slot(SlotDefinition::input("In", "image"))
    .expect("add input");
  config
    .add_slot(SlotDefinition::input("Parameters", "parameters"))
    .expect("add parameter slot");
  config
    .add_slot(SlotDefinition::output("Out", "image"))
    .expect("add output");
  let mut node = GraphNode::new("test.echo", "Echo", config, Box::new(behavior));
  node
    .input_slot_mut("In")
    .expect("slot In")
    .push_row(DataRow::new(Arc::new(0i64)));
  node.set_sweep_settings(ParameterSweepSettings {
    enabled: true,
    ..ParameterSweepSettings::default()
  });
  node
}

fn push_parameter_row(node: &mut GraphNode, set: ParameterSet) {
  node
    .input_slot_mut("Parameters")
    .expect("parameter slot")
    .push_row(DataRow::new(Arc::new(set)));
}

fn single_batch(annotations: &[(&str, &str)]) -> DataBatch {
  let merged: BTreeMap<String, String> = annotations
    .iter()
    .map(|(name, value)| (name.to_string(), value.to_string()))
    .collect();
  DataBatch::new(HashMap::from([("In".to_string(), vec![0])]), merged)
}

async fn run(node: &mut GraphNode, batches: &[DataBatch]) -> HashMap<String, Vec<DataRow>> {
  run_batches(
    node,
    batches,
    false,
    1,
    &Progress::tracing(),
    &CancelToken::new(),
  )
  .await
  .expect("run")
}

fn thresholds(outputs: &HashMap<String, Vec<DataRow>>) -> Vec<i64> {
  outputs
    .get("Out")
    .map(|rows| {
      rows
        .iter()
        .map(|row| *row.data_as::<i64>().expect("payload"))
        .collect()
    })
    .unwrap_or_default()
}

#[tokio::test]
async fn disabled_sweep_runs_once_per_batch() {
  let mut node = sweep_node(EchoBehavior::new());
  node.set_sweep_settings(ParameterSweepSettings::default());

  let outputs = run(&mut node, &[single_batch(&[])]).await;
  assert_eq!(thresholds(&outputs), vec![10]);
  assert!(outputs.get("Out").expect("rows")[0].annotations.is_empty());
}

#[tokio::test]
async fn empty_parameter_slot_behaves_like_disabled_sweep() {
  let mut node = sweep_node(EchoBehavior::new());
  let outputs = run(&mut node, &[single_batch(&[])]).await;
  assert_eq!(thresholds(&outputs), vec![10]);
}

#[tokio::test]
async fn sweep_executes_once_per_parameter_row() {
  let mut node = sweep_node(EchoBehavior::new());
  push_parameter_row(&mut node, ParameterSet::new().set("threshold", json!(20)));
  push_parameter_row(&mut node, ParameterSet::new().set("threshold", json!(30)));

  let outputs = run(&mut node, &[single_batch(&[])]).await;
  assert_eq!(thresholds(&outputs), vec![20, 30]);
}

#[tokio::test]
async fn non_default_values_are_tagged() {
  let mut node = sweep_node(EchoBehavior::new());
  push_parameter_row(&mut node, ParameterSet::new().set("threshold", json!(20)));
  push_parameter_row(&mut node, ParameterSet::new().set("threshold", json!(10)));

  let outputs = run(&mut node, &[single_batch(&[])]).await;
  let rows = outputs.get("Out").expect("rows");
  assert_eq!(rows[0].annotation_value("Threshold"), Some("20"));
  assert_eq!(rows[1].annotation_value("Threshold"), None);
}

#[tokio::test]
async fn default_values_are_tagged_when_not_limited_to_non_default() {
  let mut node = sweep_node(EchoBehavior::new());
  node.set_sweep_settings(ParameterSweepSettings {
    enabled: true,
    only_non_default: false,
    ..ParameterSweepSettings::default()
  });
  push_parameter_row(&mut node, ParameterSet::new().set("threshold", json!(10)));

  let outputs = run(&mut node, &[single_batch(&[])]).await;
  let rows = outputs.get("Out").expect("rows");
  assert_eq!(rows[0].annotation_value("Threshold"), Some("10"));
}

#[tokio::test]
async fn internal_names_and_prefix_are_honored() {
  let mut node = sweep_node(EchoBehavior::new());
  node.set_sweep_settings(ParameterSweepSettings {
    enabled: true,
    use_internal_names: true,
    annotation_prefix: "#".to_string(),
    ..ParameterSweepSettings::default()
  });
  push_parameter_row(&mut node, ParameterSet::new().set("threshold", json!(20)));

  let outputs = run(&mut node, &[single_batch(&[])]).await;
  let rows = outputs.get("Out").expect("rows");
  assert_eq!(rows[0].annotation_value("#threshold"), Some("20"));
}

#[tokio::test]
async fn annotations_can_be_disabled() {
  let mut node = sweep_node(EchoBehavior::new());
  node.set_sweep_settings(ParameterSweepSettings {
    enabled: true,
    attach_parameter_annotations: false,
    ..ParameterSweepSettings::default()
  });
  push_parameter_row(&mut node, ParameterSet::new().set("threshold", json!(20)));

  let outputs = run(&mut node, &[single_batch(&[])]).await;
  let rows = outputs.get("Out").expect("rows");
  assert_eq!(rows[0].annotation_value("Threshold"), None);
}

#[tokio::test]
async fn batch_annotations_reach_output_rows() {
  let mut node = sweep_node(EchoBehavior::new());
  let outputs = run(&mut node, &[single_batch(&[("x", "1")])]).await;
  let rows = outputs.get("Out").expect("rows");
  assert_eq!(rows[0].annotation_value("x"), Some("1"));
}

#[tokio::test]
async fn parameters_are_restored_after_sweep() {
  let mut node = sweep_node(EchoBehavior::new());
  push_parameter_row(&mut node, ParameterSet::new().set("threshold", json!(20)));

  run(&mut node, &[single_batch(&[])]).await;
  assert_eq!(node.behavior().parameter("threshold"), Some(json!(10)));
}

#[tokio::test]
async fn parameters_are_restored_when_a_row_fails() {
  let mut node = sweep_node(EchoBehavior::new().failing_on(99));
  push_parameter_row(&mut node, ParameterSet::new().set("threshold", json!(99)));

  let result = run_batches(
    &mut node,
    &[single_batch(&[])],
    false,
    1,
    &Progress::tracing(),
    &CancelToken::new(),
  )
  .await;
  assert!(result.is_err());
  assert_eq!(node.behavior().parameter("threshold"), Some(json!(10)));
}

#[tokio::test]
async fn unknown_keys_are_ignored() {
  let mut node = sweep_node(EchoBehavior::new());
  push_parameter_row(&mut node, ParameterSet::new().set("missing", json!(5)));

  let outputs = run(&mut node, &[single_batch(&[])]).await;
  assert_eq!(thresholds(&outputs), vec![10]);
  assert!(outputs.get("Out").expect("rows")[0].annotations.is_empty());
}

#[tokio::test]
async fn parallel_path_keeps_unit_order_and_node_parameters() {
  let mut node = sweep_node(EchoBehavior::new().parallel());
  push_parameter_row(&mut node, ParameterSet::new().set("threshold", json!(20)));
  push_parameter_row(&mut node, ParameterSet::new().set("threshold", json!(30)));

  let outputs = run_batches(
    &mut node,
    &[single_batch(&[])],
    true,
    4,
    &Progress::tracing(),
    &CancelToken::new(),
  )
  .await
  .expect("run");

  assert_eq!(thresholds(&outputs), vec![20, 30]);
  assert_eq!(node.behavior().parameter("threshold"), Some(json!(10)));
}

#[tokio::test]
async fn parallel_path_reports_the_first_failure() {
  let mut node = sweep_node(EchoBehavior::new().parallel().failing_on(30));
  push_parameter_row(&mut node, ParameterSet::new().set("threshold", json!(30)));
  push_parameter_row(&mut node, ParameterSet::new().set("threshold", json!(40)));

  let result = run_batches(
    &mut node,
    &[single_batch(&[])],
    true,
    4,
    &Progress::tracing(),
    &CancelToken::new(),
  )
  .await;
  assert!(matches!(result, Err(RunError::Execution { .. })));
}

#[tokio::test]
async fn cancelled_run_produces_no_output() {
  let mut node = sweep_node(EchoBehavior::new());
  let cancel = CancelToken::new();
  cancel.cancel();

  let outputs = run_batches(
    &mut node,
    &[single_batch(&[])],
    false,
    1,
    &Progress::tracing(),
    &cancel,
  )
  .await
  .expect("run");
  assert!(outputs.is_empty());
}
