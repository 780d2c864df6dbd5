//! Runtime container of rows flowing through a slot.

use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;

use super::annotation::Annotation;
use super::data_row::DataRow;
use super::data_type::DataTypeId;
use super::slot_definition::{SlotDefinition, SlotKind};

/// The live instance of a [SlotDefinition] on a node.
///
/// Owned exclusively by its node. Wiring changes may re-resolve
/// `accepted_data_type` without touching rows; removing the definition from
/// the configuration destroys the instance (and its rows).
#[derive(Debug, Clone)]
pub struct DataSlot {
  definition: SlotDefinition,
  accepted_data_type: DataTypeId,
  rows: Vec<DataRow>,
}

impl DataSlot {
  pub fn new(definition: SlotDefinition) -> Self {
    let accepted_data_type = definition.data_type.clone();
    Self {
      definition,
      accepted_data_type,
      rows: Vec::new(),
    }
  }

  pub fn name(&self) -> &str {
    &self.definition.name
  }

  pub fn kind(&self) -> SlotKind {
    self.definition.kind
  }

  pub fn definition(&self) -> &SlotDefinition {
    &self.definition
  }

  /// The resolved concrete type; starts as the declared type and is updated
  /// by inheritance resolution.
  pub fn accepted_data_type(&self) -> &DataTypeId {
    &self.accepted_data_type
  }

  pub fn set_accepted_data_type(&mut self, data_type: DataTypeId) {
    self.accepted_data_type = data_type;
  }

  pub fn rows(&self) -> &[DataRow] {
    &self.rows
  }

  pub fn row_count(&self) -> usize {
    self.rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  pub fn push_row(&mut self, row: DataRow) {
    self.rows.push(row);
  }

  /// Appends a payload with its annotations as a new row.
  pub fn add_data(&mut self, data: Arc<dyn Any + Send + Sync>, annotations: Vec<Annotation>) {
    self.rows.push(DataRow { data, annotations });
  }

  pub fn clear(&mut self) {
    self.rows.clear();
  }

  /// Distinct annotation names across all rows.
  pub fn annotation_names(&self) -> HashSet<String> {
    let mut names = HashSet::new();
    for row in &self.rows {
      for annotation in &row.annotations {
        names.insert(annotation.name.clone());
      }
    }
    names
  }
}
