//! Groups input rows into batches by matching annotation columns.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RunError;
use crate::types::{merge_annotation_values, DataBatch, DataSlot};

/// Strategy for picking the reference annotation columns that rows are
/// matched on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnMatching {
  /// Every annotation name occurring on any effective input slot.
  #[default]
  Union,
  /// Only annotation names occurring on every effective input slot.
  Intersection,
  /// An explicit user-provided column list.
  Custom,
}

/// Per-node batch generation settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchGenerationSettings {
  pub column_matching: ColumnMatching,
  /// Only consulted when `column_matching` is [ColumnMatching::Custom].
  pub custom_columns: BTreeSet<String>,
  /// Drop incomplete batches instead of failing the node.
  pub skip_incomplete: bool,
}

/// Annotation values of one row projected onto the reference columns.
/// `None` marks a column the row does not carry.
type BatchKey = BTreeMap<String, Option<String>>;

#[derive(Default)]
struct BatchAccumulator {
  per_slot_rows: HashMap<String, Vec<usize>>,
  annotation_values: BTreeMap<String, BTreeSet<String>>,
}

/// Builds the ordered batch list for one node run.
///
/// Batches come out in first-encountered-row order, so repeated runs over
/// unmodified slots yield the same sequence.
pub struct BatchGenerator {
  settings: BatchGenerationSettings,
  ignored_columns: BTreeSet<String>,
}

impl BatchGenerator {
  pub fn new(
    settings: BatchGenerationSettings,
    ignored_columns: impl IntoIterator<Item = String>,
  ) -> Self {
    Self {
      settings,
      ignored_columns: ignored_columns.into_iter().collect(),
    }
  }

  /// Groups the rows of `slots` into batches.
  ///
  /// A node without effective input slots gets exactly one empty batch so
  /// it still executes once. An incomplete batch (some slot contributed no
  /// row) is dropped under `skip_incomplete`, fatal otherwise.
  pub fn generate(&self, node: &str, slots: &[&DataSlot]) -> Result<Vec<DataBatch>, RunError> {
    if slots.is_empty() {
      debug!(node, "no effective input slots, emitting one empty batch");
      return Ok(vec![DataBatch::new(HashMap::new(), BTreeMap::new())]);
    }

    let reference = self.reference_columns(slots);
    debug!(node, columns = ?reference, "batch reference columns");

    let mut key_order: Vec<BatchKey> = Vec::new();
    let mut accumulators: HashMap<BatchKey, BatchAccumulator> = HashMap::new();

    for slot in slots {
      for (index, row) in slot.rows().iter().enumerate() {
        let key: BatchKey = reference
          .iter()
          .map(|column| {
            (
              column.clone(),
              row.annotation_value(column).map(str::to_string),
            )
          })
          .collect();
        let accumulator = accumulators.entry(key.clone()).or_insert_with(|| {
          key_order.push(key);
          BatchAccumulator::default()
        });
        accumulator
          .per_slot_rows
          .entry(slot.name().to_string())
          .or_default()
          .push(index);
        for annotation in &row.annotations {
          accumulator
            .annotation_values
            .entry(annotation.name.clone())
            .or_default()
            .insert(annotation.value.clone());
        }
      }
    }

    let mut batches = Vec::with_capacity(key_order.len());
    for key in &key_order {
      let accumulator = match accumulators.remove(key) {
        Some(accumulator) => accumulator,
        None => continue,
      };
      let missing: Vec<String> = slots
        .iter()
        .map(|slot| slot.name())
        .filter(|name| {
          accumulator
            .per_slot_rows
            .get(*name)
            .is_none_or(Vec::is_empty)
        })
        .map(str::to_string)
        .collect();
      if !missing.is_empty() {
        if self.settings.skip_incomplete {
          debug!(node, missing = ?missing, "skipping incomplete batch");
          continue;
        }
        return Err(RunError::IncompleteBatch {
          node: node.to_string(),
          missing_slots: missing,
        });
      }

      let mut merged = BTreeMap::new();
      for (name, values) in &accumulator.annotation_values {
        if let Some(value) = merge_annotation_values(values) {
          merged.insert(name.clone(), value);
        }
      }
      batches.push(DataBatch::new(accumulator.per_slot_rows, merged));
    }

    debug!(node, count = batches.len(), "batches generated");
    Ok(batches)
  }

  /// The annotation columns rows are matched on, ignored columns removed.
  fn reference_columns(&self, slots: &[&DataSlot]) -> BTreeSet<String> {
    let mut columns = match self.settings.column_matching {
      ColumnMatching::Union => {
        let mut union = BTreeSet::new();
        for slot in slots {
          union.extend(slot.annotation_names());
        }
        union
      }
      ColumnMatching::Intersection => {
        let mut iter = slots.iter();
        let mut common: BTreeSet<String> = iter
          .next()
          .map(|slot| slot.annotation_names().into_iter().collect())
          .unwrap_or_default();
        for slot in iter {
          let names = slot.annotation_names();
          common.retain(|name| names.contains(name));
        }
        common
      }
      ColumnMatching::Custom => self.settings.custom_columns.clone(),
    };
    columns.retain(|name| !self.ignored_columns.contains(name));
    columns
  }
}
