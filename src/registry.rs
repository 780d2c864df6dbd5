//! Registry of node declarations available for instantiation.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::GraphError;
use crate::node::{GraphNode, NodeBehavior};
use crate::slot_config::SlotConfiguration;

type BehaviorFactory = Box<dyn Fn() -> Box<dyn NodeBehavior> + Send + Sync>;

/// Static description of a node type: identity, default slot
/// configuration, and the factory producing its behavior.
pub struct NodeDeclaration {
  id: String,
  name: String,
  description: String,
  slot_configuration: SlotConfiguration,
  factory: BehaviorFactory,
}

impl NodeDeclaration {
  pub fn new(
    id: impl Into<String>,
    name: impl Into<String>,
    slot_configuration: SlotConfiguration,
    factory: impl Fn() -> Box<dyn NodeBehavior> + Send + Sync + 'static,
  ) -> Self {
    Self {
      id: id.into(),
      name: name.into(),
      description: String::new(),
      slot_configuration,
      factory: Box::new(factory),
    }
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = description.into();
    self
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn description(&self) -> &str {
    &self.description
  }

  pub fn slot_configuration(&self) -> &SlotConfiguration {
    &self.slot_configuration
  }

  /// Instantiates a fresh node from this declaration.
  pub fn create_node(&self) -> GraphNode {
    GraphNode::new(
      self.id.clone(),
      self.name.clone(),
      self.slot_configuration.clone(),
      (self.factory)(),
    )
  }
}

impl std::fmt::Debug for NodeDeclaration {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("NodeDeclaration")
      .field("id", &self.id)
      .field("name", &self.name)
      .finish_non_exhaustive()
  }
}

/// Collection of known node declarations.
///
/// Owned and passed around explicitly; each engine instance carries its
/// own registry instead of consulting a process-wide one.
#[derive(Default)]
pub struct NodeRegistry {
  declarations: BTreeMap<String, NodeDeclaration>,
}

impl NodeRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers a declaration, replacing any previous one with the same id.
  pub fn register(&mut self, declaration: NodeDeclaration) {
    debug!(id = %declaration.id(), "declaration registered");
    self
      .declarations
      .insert(declaration.id.clone(), declaration);
  }

  pub fn declaration(&self, id: &str) -> Option<&NodeDeclaration> {
    self.declarations.get(id)
  }

  /// Declarations sorted by id.
  pub fn declarations(&self) -> impl Iterator<Item = &NodeDeclaration> {
    self.declarations.values()
  }

  pub fn len(&self) -> usize {
    self.declarations.len()
  }

  pub fn is_empty(&self) -> bool {
    self.declarations.is_empty()
  }

  /// Instantiates a node from the named declaration.
  pub fn create_node(&self, id: &str) -> Result<GraphNode, GraphError> {
    let declaration =
      self
        .declarations
        .get(id)
        .ok_or_else(|| GraphError::UnknownDeclaration {
          id: id.to_string(),
        })?;
    Ok(declaration.create_node())
  }
}

impl std::fmt::Debug for NodeRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("NodeRegistry")
      .field("ids", &self.declarations.keys().collect::<Vec<_>>())
      .finish()
  }
}
