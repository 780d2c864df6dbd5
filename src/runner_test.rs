//! Tests for whole-graph execution.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::error::RunError;
use crate::graph::{Graph, SlotRef};
use crate::node::{GraphNode, NodeBehavior};
use crate::params::{MapParameters, ParameterCollection};
use crate::progress::{CancelToken, Progress};
use crate::runner::{run_graph, RunOptions};
use crate::slot_config::SlotConfiguration;
use crate::types::{BatchInput, BatchOutput};

#[derive(Clone)]
struct SourceBehavior {
  params: MapParameters,
  values: Vec<i64>,
  annotation: Option<(String, String)>,
}

impl SourceBehavior {
  fn new(values: &[i64]) -> Self {
    Self {
      params: MapParameters::new(),
      values: values.to_vec(),
      annotation: None,
    }
  }

  fn annotated(mut self, name: &str, value: &str) -> Self {
    self.annotation = Some((name.to_string(), value.to_string()));
    self
  }
}

impl ParameterCollection for SourceBehavior {
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
impl NodeBehavior for SourceBehavior {
  async fn run_batch(
    &self,
    _input: &BatchInput,
    output: &mut BatchOutput,
    _progress: &Progress,
    _cancel: &CancelToken,
  ) -> Result<(), RunError> {
    for value in &self.values {
      let annotations = self
        .annotation
        .iter()
        .map(|(name, text)| crate::types::Annotation::new(name.clone(), text.clone()))
        .collect();
      output.push_data("Out", Arc::new(*value), annotations);
    }
    Ok(())
  }
}

#[derive(Clone)]
struct DoubleBehavior {
  params: MapParameters,
}

impl DoubleBehavior {
  fn new() -> Self {
    Self {
      params: MapParameters::new().with("factor", json!(2)),
    }
  }

  fn factor(&self) -> i64 {
    self
      .params
      .parameter("factor")
      .and_then(|v| v.as_i64())
      .unwrap_or(2)
  }
}

impl ParameterCollection for DoubleBehavior {
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
impl NodeBehavior for DoubleBehavior {
  async fn run_batch(
    &self,
    input: &BatchInput,
    output: &mut BatchOutput,
    _progress: &Progress,
    _cancel: &CancelToken,
  ) -> Result<(), RunError> {
    for row in input.rows("In") {
      let value = row.data_as::<i64>().ok_or_else(|| RunError::Execution {
        node: "Double".to_string(),
        message: "expected an integer payload".to_string(),
      })?;
      output.push_data("Out", Arc::new(value * self.factor()), Vec::new());
    }
    Ok(())
  }
}

#[derive(Clone)]
struct MisdirectedBehavior {
  params: MapParameters,
}

impl ParameterCollection for MisdirectedBehavior {
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
impl NodeBehavior for MisdirectedBehavior {
  async fn run_batch(
    &self,
    _input: &BatchInput,
    output: &mut BatchOutput,
    _progress: &Progress,
    _cancel: &CancelToken,
  ) -> Result<(), RunError> {
    output.push_data("Bogus", Arc::new(1i64), Vec::new());
    output.push_data("Out", Arc::new(2i64), Vec::new());
    Ok(())
  }
}

fn source_node(values: &[i64]) -> GraphNode {
  source_node_with(SourceBehavior::new(values))
}

fn source_node_with(behavior: SourceBehavior) -> GraphNode {
  let config = SlotConfiguration::builder()
    .add_output("Out", "image")
    .build();
  GraphNode::new("test.source", "Source", config, Box::new(behavior))
}

fn double_node() -> GraphNode {
  let config = SlotConfiguration::builder()
    .add_input("In", "image")
    .add_output("Out", "image")
    .build();
  GraphNode::new("test.double", "Double", config, Box::new(DoubleBehavior::new()))
}

fn output_values(graph: &Graph, id: crate::types::NodeId) -> Vec<i64> {
  graph
    .node(id)
    .expect("node")
    .output_slot("Out")
    .expect("slot Out")
    .rows()
    .iter()
    .map(|row| *row.data_as::<i64>().expect("payload"))
    .collect()
}

#[tokio::test]
async fn rows_flow_from_source_through_transform() {
  let mut graph = Graph::new();
  let source = graph.add_node(source_node(&[1, 2, 3]));
  let double = graph.add_node(double_node());
  graph
    .connect(SlotRef::new(source, "Out"), SlotRef::new(double, "In"))
    .expect("connect");

  let report = run_graph(&mut graph, &RunOptions::default())
    .await
    .expect("run");

  assert_eq!(report.executed_nodes, vec![source, double]);
  assert!(!report.cancelled);
  assert_eq!(output_values(&graph, source), vec![1, 2, 3]);
  assert_eq!(output_values(&graph, double), vec![2, 4, 6]);
}

#[tokio::test]
async fn batch_annotations_propagate_to_downstream_rows() {
  let mut graph = Graph::new();
  let source = graph.add_node(source_node_with(
    SourceBehavior::new(&[5]).annotated("sample", "s1"),
  ));
  let double = graph.add_node(double_node());
  graph
    .connect(SlotRef::new(source, "Out"), SlotRef::new(double, "In"))
    .expect("connect");

  run_graph(&mut graph, &RunOptions::default())
    .await
    .expect("run");

  let rows = graph
    .node(double)
    .expect("node")
    .output_slot("Out")
    .expect("slot Out")
    .rows();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].annotation_value("sample"), Some("s1"));
}

#[tokio::test]
async fn node_without_inputs_executes_once() {
  let mut graph = Graph::new();
  let source = graph.add_node(source_node(&[7]));

  let report = run_graph(&mut graph, &RunOptions::default())
    .await
    .expect("run");

  assert_eq!(report.executed_nodes, vec![source]);
  assert_eq!(output_values(&graph, source), vec![7]);
}

#[tokio::test]
async fn reruns_replace_previous_output_rows() {
  let mut graph = Graph::new();
  let source = graph.add_node(source_node(&[1, 2]));

  run_graph(&mut graph, &RunOptions::default())
    .await
    .expect("first run");
  run_graph(&mut graph, &RunOptions::default())
    .await
    .expect("second run");

  assert_eq!(output_values(&graph, source), vec![1, 2]);
}

#[tokio::test]
async fn cancelled_run_reports_partial_execution() {
  let mut graph = Graph::new();
  graph.add_node(source_node(&[1]));
  let cancel = CancelToken::new();
  cancel.cancel();

  let options = RunOptions {
    cancel,
    ..RunOptions::default()
  };
  let report = run_graph(&mut graph, &options).await.expect("run");

  assert!(report.cancelled);
  assert!(report.executed_nodes.is_empty());
}

#[tokio::test]
async fn incomplete_batches_fail_the_run() {
  let mut graph = Graph::new();
  let source = graph.add_node(source_node(&[1]));
  let join = graph.add_node({
    let config = SlotConfiguration::builder()
      .add_input("A", "image")
      .add_input("B", "image")
      .add_output("Out", "image")
      .build();
    GraphNode::new("test.join", "Join", config, Box::new(DoubleBehavior::new()))
  });
  graph
    .connect(SlotRef::new(source, "Out"), SlotRef::new(join, "A"))
    .expect("connect");

  let err = run_graph(&mut graph, &RunOptions::default())
    .await
    .expect_err("incomplete");
  assert!(matches!(err, RunError::IncompleteBatch { .. }));
}

#[tokio::test]
async fn rows_for_undeclared_output_slots_are_dropped() {
  let mut graph = Graph::new();
  let node = graph.add_node({
    let config = SlotConfiguration::builder()
      .add_output("Out", "image")
      .build();
    GraphNode::new(
      "test.misdirected",
      "Misdirected",
      config,
      Box::new(MisdirectedBehavior {
        params: MapParameters::new(),
      }),
    )
  });

  run_graph(&mut graph, &RunOptions::default())
    .await
    .expect("run");

  assert_eq!(output_values(&graph, node), vec![2]);
}
