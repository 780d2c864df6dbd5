//! Parameter sweeps: replaying the batch pipeline per parameter row.
//!
//! When a node's sweep is enabled, each row of its auxiliary parameter
//! slot temporarily overrides the behavior's parameters and the whole
//! batch list runs once per row. The serial path mutates the behavior in
//! place, bracketed by a snapshot/restore guard; the parallel path gives
//! every (parameter row, batch) unit its own clone of the behavior so no
//! partially-applied parameter state is ever shared.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::RunError;
use crate::node::{GraphNode, NodeBehavior};
use crate::params::snapshot_parameters;
use crate::progress::{CancelToken, Progress};
use crate::types::{Annotation, BatchInput, BatchOutput, DataBatch, DataRow, ParameterSet};

/// Default name of the auxiliary input slot holding [ParameterSet] rows.
pub const DEFAULT_PARAMETER_SLOT: &str = "Parameters";

/// Per-node sweep settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSweepSettings {
  pub enabled: bool,
  /// Input slot whose rows drive the sweep; excluded from batch matching.
  pub slot_name: String,
  /// Tag output rows with the parameters applied to their unit.
  pub attach_parameter_annotations: bool,
  /// Tag only parameters whose row value differs from the pre-sweep value.
  pub only_non_default: bool,
  /// Use the internal parameter key instead of its display name.
  pub use_internal_names: bool,
  pub annotation_prefix: String,
}

impl Default for ParameterSweepSettings {
  fn default() -> Self {
    Self {
      enabled: false,
      slot_name: DEFAULT_PARAMETER_SLOT.to_string(),
      attach_parameter_annotations: true,
      only_non_default: true,
      use_internal_names: false,
      annotation_prefix: String::new(),
    }
  }
}

/// One sweep iteration: the overrides to apply and the annotations that
/// tag rows produced under them.
#[derive(Clone, Default)]
struct ParameterContext {
  values: BTreeMap<String, serde_json::Value>,
  annotations: Vec<Annotation>,
}

/// Runs every (parameter row, batch) unit of a node and collects the
/// produced rows per output slot.
///
/// With the sweep disabled or the parameter slot empty there is exactly
/// one unit per batch, executed with the current parameter values. Units
/// run in (parameter row, batch) order; the parallel path preserves that
/// order in the collected output.
pub async fn run_batches(
  node: &mut GraphNode,
  batches: &[DataBatch],
  parallelization_enabled: bool,
  max_threads: usize,
  progress: &Progress,
  cancel: &CancelToken,
) -> Result<HashMap<String, Vec<DataRow>>, RunError> {
  let node_name = node.name().to_string();
  let contexts = parameter_contexts(node);
  let inputs: Vec<BatchInput> = batches
    .iter()
    .map(|batch| materialize_input(node, batch))
    .collect();

  let parallel = parallelization_enabled
    && max_threads > 1
    && node.behavior().supports_parallelization();
  debug!(
    node = %node_name,
    parameter_rows = contexts.len(),
    batches = inputs.len(),
    parallel,
    "running node batches"
  );

  if parallel {
    run_parallel(
      node,
      &node_name,
      &contexts,
      &inputs,
      max_threads,
      progress,
      cancel,
    )
    .await
  } else {
    run_serial(node, &node_name, &contexts, &inputs, progress, cancel).await
  }
}

async fn run_serial(
  node: &mut GraphNode,
  node_name: &str,
  contexts: &[ParameterContext],
  inputs: &[BatchInput],
  progress: &Progress,
  cancel: &CancelToken,
) -> Result<HashMap<String, Vec<DataRow>>, RunError> {
  let mut outputs: HashMap<String, Vec<DataRow>> = HashMap::new();
  let mut restore = ParameterRestore::new(node.behavior_mut());
  for (row_index, context) in contexts.iter().enumerate() {
    if cancel.is_cancelled() {
      break;
    }
    let scoped = progress.nested(&format!("Data row {}/{}", row_index + 1, contexts.len()));
    restore.apply(node_name, &context.values);
    for (batch_index, input) in inputs.iter().enumerate() {
      if cancel.is_cancelled() {
        break;
      }
      scoped.report(&format!("Batch {}/{}", batch_index + 1, inputs.len()));
      let mut output = BatchOutput::new(base_annotations(input, &context.annotations));
      restore
        .behavior()
        .run_batch(input, &mut output, &scoped, cancel)
        .await?;
      collect_outputs(&mut outputs, output);
    }
  }
  Ok(outputs)
}

async fn run_parallel(
  node: &GraphNode,
  node_name: &str,
  contexts: &[ParameterContext],
  inputs: &[BatchInput],
  max_threads: usize,
  progress: &Progress,
  cancel: &CancelToken,
) -> Result<HashMap<String, Vec<DataRow>>, RunError> {
  let semaphore = Arc::new(Semaphore::new(max_threads));
  let mut handles = Vec::with_capacity(contexts.len() * inputs.len());
  'schedule: for (row_index, context) in contexts.iter().enumerate() {
    for (batch_index, input) in inputs.iter().enumerate() {
      if cancel.is_cancelled() {
        break 'schedule;
      }
      let semaphore = Arc::clone(&semaphore);
      let mut behavior = dyn_clone::clone_box(node.behavior());
      let context = context.clone();
      let input = input.clone();
      let cancel = cancel.clone();
      let owner = node_name.to_string();
      let scoped = progress
        .nested(&format!("Data row {}/{}", row_index + 1, contexts.len()))
        .nested(&format!("Batch {}/{}", batch_index + 1, inputs.len()));
      handles.push(tokio::spawn(async move {
        let _permit = semaphore
          .acquire_owned()
          .await
          .map_err(|err| RunError::Execution {
            node: owner.clone(),
            message: err.to_string(),
          })?;
        if cancel.is_cancelled() {
          return Ok(HashMap::new());
        }
        apply_parameters(behavior.as_mut(), &owner, &context.values);
        let mut output = BatchOutput::new(base_annotations(&input, &context.annotations));
        behavior
          .run_batch(&input, &mut output, &scoped, &cancel)
          .await?;
        Ok::<_, RunError>(output.into_rows())
      }));
    }
  }

  // Every unit is awaited before the first error is raised so no task is
  // left running detached.
  let mut outputs: HashMap<String, Vec<DataRow>> = HashMap::new();
  let mut first_error = None;
  for joined in join_all(handles).await {
    match joined {
      Ok(Ok(rows)) => {
        for (slot, slot_rows) in rows {
          outputs.entry(slot).or_default().extend(slot_rows);
        }
      }
      Ok(Err(err)) => {
        if first_error.is_none() {
          first_error = Some(err);
        }
      }
      Err(err) => {
        if first_error.is_none() {
          first_error = Some(RunError::Execution {
            node: node_name.to_string(),
            message: err.to_string(),
          });
        }
      }
    }
  }
  match first_error {
    Some(err) => Err(err),
    None => Ok(outputs),
  }
}

/// Builds the sweep iteration list for a node.
///
/// Disabled sweep, missing slot, or no usable rows all collapse to a
/// single no-override context.
fn parameter_contexts(node: &GraphNode) -> Vec<ParameterContext> {
  let settings = node.sweep_settings();
  if !settings.enabled {
    return vec![ParameterContext::default()];
  }
  let sets: Vec<ParameterSet> = node
    .input_slot(&settings.slot_name)
    .map(|slot| {
      slot
        .rows()
        .iter()
        .enumerate()
        .filter_map(|(index, row)| match row.data_as::<ParameterSet>() {
          Some(set) => Some(set.clone()),
          None => {
            warn!(
              node = %node.name(),
              row = index,
              "parameter slot row is not a parameter set, skipped"
            );
            None
          }
        })
        .collect()
    })
    .unwrap_or_default();
  if sets.is_empty() {
    return vec![ParameterContext::default()];
  }

  let snapshot = snapshot_parameters(node.behavior());
  let mut non_default: BTreeSet<String> = BTreeSet::new();
  for set in &sets {
    for (key, value) in set.iter() {
      if snapshot.get(key).is_some_and(|current| current != value) {
        non_default.insert(key.to_string());
      }
    }
  }

  sets
    .iter()
    .map(|set| {
      let values: BTreeMap<String, serde_json::Value> = set
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect();
      let annotations = parameter_annotations(node, settings, &snapshot, &non_default, &values);
      ParameterContext {
        values,
        annotations,
      }
    })
    .collect()
}

/// Annotations tagging rows produced under one parameter context.
fn parameter_annotations(
  node: &GraphNode,
  settings: &ParameterSweepSettings,
  snapshot: &BTreeMap<String, serde_json::Value>,
  non_default: &BTreeSet<String>,
  values: &BTreeMap<String, serde_json::Value>,
) -> Vec<Annotation> {
  if !settings.attach_parameter_annotations {
    return Vec::new();
  }
  let mut annotations = Vec::new();
  for (key, value) in values {
    // Keys the behavior does not know are warned about at apply time.
    if !snapshot.contains_key(key) {
      continue;
    }
    if settings.only_non_default {
      let differs = snapshot.get(key).is_some_and(|current| current != value);
      if !(non_default.contains(key) && differs) {
        continue;
      }
    }
    let name = if settings.use_internal_names {
      key.clone()
    } else {
      node
        .behavior()
        .parameter_display_name(key)
        .unwrap_or_else(|| key.clone())
    };
    annotations.push(Annotation::new(
      format!("{}{}", settings.annotation_prefix, name),
      annotation_text(value),
    ));
  }
  annotations
}

/// String form of a parameter value: plain strings stay unquoted,
/// everything else is serialized as JSON.
fn annotation_text(value: &serde_json::Value) -> String {
  match value {
    serde_json::Value::String(text) => text.clone(),
    other => other.to_string(),
  }
}

/// Clones the rows a batch selected from the node's effective input slots.
fn materialize_input(node: &GraphNode, batch: &DataBatch) -> BatchInput {
  let mut per_slot = HashMap::new();
  for slot in node.effective_input_slots() {
    let rows: Vec<DataRow> = batch
      .row_indices(slot.name())
      .iter()
      .filter_map(|&index| slot.rows().get(index).cloned())
      .collect();
    per_slot.insert(slot.name().to_string(), rows);
  }
  BatchInput::new(per_slot, batch.merged_annotations().clone())
}

/// Merged batch annotations first, parameter annotations after; later
/// entries win on name conflicts when [BatchOutput] overlays them.
fn base_annotations(input: &BatchInput, parameters: &[Annotation]) -> Vec<Annotation> {
  let mut base: Vec<Annotation> = input
    .merged_annotations()
    .iter()
    .map(|(name, value)| Annotation::new(name.clone(), value.clone()))
    .collect();
  base.extend(parameters.iter().cloned());
  base
}

fn apply_parameters(
  behavior: &mut dyn NodeBehavior,
  node: &str,
  values: &BTreeMap<String, serde_json::Value>,
) {
  for (key, value) in values {
    if !behavior.set_parameter(key, value.clone()) {
      warn!(node, key = %key, "ignoring unknown sweep parameter");
    }
  }
}

/// Snapshot/restore bracket around the serial sweep loop. Restores every
/// parameter on drop, error paths included.
struct ParameterRestore<'a> {
  behavior: &'a mut Box<dyn NodeBehavior>,
  snapshot: BTreeMap<String, serde_json::Value>,
}

impl<'a> ParameterRestore<'a> {
  fn new(behavior: &'a mut Box<dyn NodeBehavior>) -> Self {
    let snapshot = snapshot_parameters(behavior.as_ref());
    Self {
      behavior,
      snapshot,
    }
  }

  fn apply(&mut self, node: &str, values: &BTreeMap<String, serde_json::Value>) {
    apply_parameters(self.behavior.as_mut(), node, values);
  }

  fn behavior(&self) -> &dyn NodeBehavior {
    self.behavior.as_ref()
  }
}

impl Drop for ParameterRestore<'_> {
  fn drop(&mut self) {
    for (key, value) in &self.snapshot {
      self.behavior.set_parameter(key, value.clone());
    }
  }
}

fn collect_outputs(outputs: &mut HashMap<String, Vec<DataRow>>, batch: BatchOutput) {
  for (slot, rows) in batch.into_rows() {
    outputs.entry(slot).or_default().extend(rows);
  }
}
