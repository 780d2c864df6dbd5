//! One unit of work: matched row indices across input slots.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::annotation::Annotation;
use super::data_row::DataRow;

/// Joins the distinct values of one annotation name across contributing
/// rows. A single distinct value is kept verbatim; several are sorted
/// lexicographically and serialized as one JSON array string.
pub fn merge_annotation_values(values: &BTreeSet<String>) -> Option<String> {
  match values.len() {
    0 => None,
    1 => values.iter().next().cloned(),
    _ => {
      let array = serde_json::Value::Array(
        values
          .iter()
          .map(|v| serde_json::Value::String(v.clone()))
          .collect(),
      );
      Some(array.to_string())
    }
  }
}

/// A group of rows (per input slot) processed together.
///
/// Built once per run and immutable afterwards. `merged_annotations` carries
/// the full annotation sets of all contributing rows, merged with
/// [merge_annotation_values]; `BTreeMap` keeps serialized key order stable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataBatch {
  per_slot_rows: HashMap<String, Vec<usize>>,
  merged_annotations: BTreeMap<String, String>,
}

impl DataBatch {
  pub fn new(
    per_slot_rows: HashMap<String, Vec<usize>>,
    merged_annotations: BTreeMap<String, String>,
  ) -> Self {
    Self {
      per_slot_rows,
      merged_annotations,
    }
  }

  /// Row indices contributed by the named input slot.
  pub fn row_indices(&self, slot_name: &str) -> &[usize] {
    self
      .per_slot_rows
      .get(slot_name)
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }

  pub fn slot_names(&self) -> impl Iterator<Item = &str> {
    self.per_slot_rows.keys().map(String::as_str)
  }

  pub fn merged_annotations(&self) -> &BTreeMap<String, String> {
    &self.merged_annotations
  }

  pub fn is_empty(&self) -> bool {
    self.per_slot_rows.values().all(Vec::is_empty)
  }
}

/// The materialized view of a [DataBatch] handed to a node behavior:
/// cloned rows per slot (payloads shared via `Arc`) plus the merged
/// annotations.
#[derive(Debug, Clone)]
pub struct BatchInput {
  per_slot_rows: HashMap<String, Vec<DataRow>>,
  merged_annotations: BTreeMap<String, String>,
}

impl BatchInput {
  pub fn new(
    per_slot_rows: HashMap<String, Vec<DataRow>>,
    merged_annotations: BTreeMap<String, String>,
  ) -> Self {
    Self {
      per_slot_rows,
      merged_annotations,
    }
  }

  pub fn rows(&self, slot_name: &str) -> &[DataRow] {
    self
      .per_slot_rows
      .get(slot_name)
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }

  pub fn merged_annotations(&self) -> &BTreeMap<String, String> {
    &self.merged_annotations
  }
}

/// Collects rows a behavior produces for its output slots.
///
/// Every pushed row is tagged with the batch's base annotations (merged
/// batch annotations plus any sweep parameter annotations); annotations
/// supplied with the row win on name conflicts.
#[derive(Debug, Default)]
pub struct BatchOutput {
  base_annotations: Vec<Annotation>,
  per_slot_rows: HashMap<String, Vec<DataRow>>,
}

impl BatchOutput {
  pub fn new(base_annotations: Vec<Annotation>) -> Self {
    Self {
      base_annotations,
      per_slot_rows: HashMap::new(),
    }
  }

  /// Appends a payload to the named output slot, overlaying the base
  /// annotations.
  pub fn push_data(
    &mut self,
    slot_name: &str,
    data: Arc<dyn Any + Send + Sync>,
    annotations: Vec<Annotation>,
  ) {
    let mut row = DataRow::new(data);
    for annotation in &self.base_annotations {
      row.set_annotation(annotation.name.clone(), annotation.value.clone());
    }
    for annotation in annotations {
      row.set_annotation(annotation.name, annotation.value);
    }
    self
      .per_slot_rows
      .entry(slot_name.to_string())
      .or_default()
      .push(row);
  }

  pub fn rows(&self, slot_name: &str) -> &[DataRow] {
    self
      .per_slot_rows
      .get(slot_name)
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }

  /// Consumes the output, yielding rows per output slot name.
  pub fn into_rows(self) -> HashMap<String, Vec<DataRow>> {
    self.per_slot_rows
  }
}
