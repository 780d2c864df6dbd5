//! Whole-graph execution: topological order, row transfer, batch pipeline.
//!
//! - [run_graph]: resolve inheritance, order the nodes, and run each node's
//!   batch pipeline (optionally crossed with its parameter sweep).

use std::collections::HashMap;

use tracing::{info, instrument, warn};

use crate::batch_gen::BatchGenerator;
use crate::error::RunError;
use crate::graph::Graph;
use crate::progress::{CancelToken, Progress};
use crate::sweep;
use crate::types::{DataRow, NodeId};

/// Options for [run_graph].
#[derive(Debug, Clone)]
pub struct RunOptions {
  /// Allow behaviors that support it to run their units concurrently.
  pub parallelization_enabled: bool,
  /// Upper bound on concurrently running units per node.
  pub max_threads: usize,
  pub cancel: CancelToken,
  pub progress: Progress,
}

impl Default for RunOptions {
  fn default() -> Self {
    Self {
      parallelization_enabled: false,
      max_threads: 1,
      cancel: CancelToken::new(),
      progress: Progress::tracing(),
    }
  }
}

/// Outcome of a graph run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
  /// Nodes that finished, in execution order.
  pub executed_nodes: Vec<NodeId>,
  /// Whether the run stopped early on a cancellation request.
  pub cancelled: bool,
}

/// Executes every node of the graph in topological order.
///
/// Inheritance is re-resolved up front so accepted slot types are current
/// even when the graph was mutated without [Graph::update_node] calls.
/// Each node pulls rows from its connected upstream output slots, groups
/// them into batches, and runs the batch pipeline; produced rows replace
/// the node's output slot contents. Cancellation stops before the next
/// node; the report lists the nodes that did run.
#[instrument(skip_all)]
pub async fn run_graph(graph: &mut Graph, options: &RunOptions) -> Result<RunReport, RunError> {
  let ids: Vec<NodeId> = graph.nodes().map(|node| node.id()).collect();
  for id in &ids {
    graph.update_node(*id)?;
  }
  let order = graph.topological_order()?;
  info!(nodes = order.len(), "graph run started");

  let mut executed = Vec::with_capacity(order.len());
  for id in order {
    if options.cancel.is_cancelled() {
      info!("graph run cancelled");
      return Ok(RunReport {
        executed_nodes: executed,
        cancelled: true,
      });
    }
    graph.pull_input_rows(id);
    run_node(graph, id, options).await?;
    executed.push(id);
  }

  Ok(RunReport {
    executed_nodes: executed,
    cancelled: options.cancel.is_cancelled(),
  })
}

async fn run_node(graph: &mut Graph, id: NodeId, options: &RunOptions) -> Result<(), RunError> {
  let node = graph.node_mut(id).ok_or_else(|| RunError::Execution {
    node: id.to_string(),
    message: "node disappeared during the run".to_string(),
  })?;
  let node_name = node.name().to_string();
  let progress = options.progress.nested(&node_name);
  progress.report("generating batches");

  let generator = BatchGenerator::new(
    node.batch_settings().clone(),
    node.behavior().ignored_annotation_columns(),
  );
  let batches = generator.generate(&node_name, &node.effective_input_slots())?;

  let outputs = sweep::run_batches(
    node,
    &batches,
    options.parallelization_enabled,
    options.max_threads,
    &progress,
    &options.cancel,
  )
  .await?;
  store_outputs(&node_name, node, outputs);
  info!(node = %node_name, "node executed");
  Ok(())
}

/// Replaces the node's output slot rows with the produced rows. Rows for
/// slot names the node does not declare are dropped with a warning.
fn store_outputs(
  node_name: &str,
  node: &mut crate::node::GraphNode,
  outputs: HashMap<String, Vec<DataRow>>,
) {
  let names: Vec<String> = node
    .output_slots()
    .iter()
    .map(|slot| slot.name().to_string())
    .collect();
  for name in names {
    if let Some(slot) = node.output_slot_mut(&name) {
      slot.clear();
    }
  }
  for (slot_name, rows) in outputs {
    match node.output_slot_mut(&slot_name) {
      Some(slot) => {
        for row in rows {
          slot.push_row(row);
        }
      }
      None => {
        warn!(
          node = node_name,
          slot = %slot_name,
          "behavior produced rows for an undeclared output slot"
        );
      }
    }
  }
}
