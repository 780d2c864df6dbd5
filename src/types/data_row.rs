//! A single annotated data item inside a slot.

use std::any::Any;
use std::sync::Arc;

use super::annotation::Annotation;

/// One row of a [super::DataSlot]: an opaque payload plus its annotations.
///
/// The payload is shared, not copied; cloning a row clones the `Arc`.
#[derive(Clone)]
pub struct DataRow {
  pub data: Arc<dyn Any + Send + Sync>,
  pub annotations: Vec<Annotation>,
}

impl DataRow {
  pub fn new(data: Arc<dyn Any + Send + Sync>) -> Self {
    Self {
      data,
      annotations: Vec::new(),
    }
  }

  pub fn with_annotation(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.set_annotation(name, value);
    self
  }

  /// Sets an annotation, replacing any existing value for the same name.
  pub fn set_annotation(&mut self, name: impl Into<String>, value: impl Into<String>) {
    let name = name.into();
    let value = value.into();
    match self.annotations.iter_mut().find(|a| a.name == name) {
      Some(existing) => existing.value = value,
      None => self.annotations.push(Annotation { name, value }),
    }
  }

  pub fn annotation_value(&self, name: &str) -> Option<&str> {
    self
      .annotations
      .iter()
      .find(|a| a.name == name)
      .map(|a| a.value.as_str())
  }

  /// Downcasts the payload to a concrete type.
  pub fn data_as<T: Any + Send + Sync>(&self) -> Option<&T> {
    self.data.downcast_ref::<T>()
  }
}

impl std::fmt::Debug for DataRow {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DataRow")
      .field("annotations", &self.annotations)
      .finish_non_exhaustive()
  }
}
