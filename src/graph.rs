//! Directed graph of nodes with slot-to-slot edges.
//!
//! The graph is the topology collaborator for inheritance: it answers
//! [Graph::source_slot_of]/[Graph::target_slots_of], resolves output slot
//! types transitively ([Graph::resolved_output_type]) and propagates
//! re-resolution to downstream nodes after slot changes
//! ([Graph::update_slot_inheritance]).

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::GraphError;
use crate::node::GraphNode;
use crate::types::{DataTypeId, NodeId, SlotKind, INHERIT_FIRST_INPUT};

/// Address of one slot on one node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotRef {
  pub node: NodeId,
  pub slot: String,
}

impl SlotRef {
  pub fn new(node: NodeId, slot: impl Into<String>) -> Self {
    Self {
      node,
      slot: slot.into(),
    }
  }
}

/// Directed graph of [GraphNode]s.
///
/// Edges run from an output slot to an input slot; every input slot has at
/// most one incoming edge. Nodes and edges keep insertion order so
/// traversals are deterministic.
#[derive(Debug, Default)]
pub struct Graph {
  nodes: HashMap<NodeId, GraphNode>,
  node_order: Vec<NodeId>,
  edges: Vec<(SlotRef, SlotRef)>,
}

impl Graph {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_node(&mut self, node: GraphNode) -> NodeId {
    let id = node.id();
    self.node_order.push(id);
    self.nodes.insert(id, node);
    id
  }

  /// Removes a node and every edge touching it.
  pub fn remove_node(&mut self, id: NodeId) -> Result<GraphNode, GraphError> {
    let node = self.nodes.remove(&id).ok_or_else(|| GraphError::UnknownNode {
      node: id.to_string(),
    })?;
    self.node_order.retain(|n| *n != id);
    self.edges.retain(|(s, t)| s.node != id && t.node != id);
    Ok(node)
  }

  pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
    self.nodes.get(&id)
  }

  pub fn node_mut(&mut self, id: NodeId) -> Option<&mut GraphNode> {
    self.nodes.get_mut(&id)
  }

  /// Nodes in insertion order.
  pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
    self.node_order.iter().filter_map(|id| self.nodes.get(id))
  }

  pub fn node_count(&self) -> usize {
    self.nodes.len()
  }

  pub fn edges(&self) -> &[(SlotRef, SlotRef)] {
    &self.edges
  }

  /// Connects an output slot to an input slot and re-resolves inheritance
  /// downstream of the target.
  pub fn connect(&mut self, source: SlotRef, target: SlotRef) -> Result<(), GraphError> {
    if source.node == target.node {
      return Err(self.invalid_connection(&source, &target, "source and target are the same node"));
    }
    self.expect_slot(&source, SlotKind::Output)?;
    self.expect_slot(&target, SlotKind::Input)?;
    if self.source_slot_of(&target).is_some() {
      return Err(self.invalid_connection(&source, &target, "input slot is already connected"));
    }
    debug!(source = %self.describe(&source), target = %self.describe(&target), "connect");
    self.edges.push((source, target.clone()));
    self.update_slot_inheritance(target.node)?;
    Ok(())
  }

  /// Removes the incoming edge of an input slot. Returns whether an edge
  /// was removed.
  pub fn disconnect(&mut self, target: &SlotRef) -> Result<bool, GraphError> {
    let before = self.edges.len();
    self.edges.retain(|(_, t)| t != target);
    if self.edges.len() == before {
      return Ok(false);
    }
    debug!(target = %self.describe(target), "disconnect");
    self.update_slot_inheritance(target.node)?;
    Ok(true)
  }

  /// The output slot feeding the given input slot, if any.
  pub fn source_slot_of(&self, target: &SlotRef) -> Option<&SlotRef> {
    self
      .edges
      .iter()
      .find(|(_, t)| t == target)
      .map(|(s, _)| s)
  }

  /// All input slots fed by the given output slot.
  pub fn target_slots_of(&self, source: &SlotRef) -> Vec<SlotRef> {
    self
      .edges
      .iter()
      .filter(|(s, _)| s == source)
      .map(|(_, t)| t.clone())
      .collect()
  }

  /// Resolves the concrete type of an output slot, following inheritance
  /// through the graph. Fails with [GraphError::CyclicInheritance] instead
  /// of looping.
  pub fn resolved_output_type(
    &self,
    node_id: NodeId,
    slot_name: &str,
  ) -> Result<DataTypeId, GraphError> {
    let mut chain: Vec<(NodeId, String)> = Vec::new();
    self.resolve_output_type_inner(node_id, slot_name, &mut chain)
  }

  fn resolve_output_type_inner(
    &self,
    node_id: NodeId,
    slot_name: &str,
    chain: &mut Vec<(NodeId, String)>,
  ) -> Result<DataTypeId, GraphError> {
    let node = self.nodes.get(&node_id).ok_or_else(|| GraphError::UnknownNode {
      node: node_id.to_string(),
    })?;
    let definition = node
      .slot_configuration()
      .slot(slot_name, SlotKind::Output)
      .ok_or_else(|| GraphError::UnknownSlot {
        slot: format!("{}/{}", node.name(), slot_name),
        kind: SlotKind::Output.to_string(),
      })?;

    let Some(inherited_from) = definition.inherited_from.as_deref() else {
      return Ok(definition.data_type.clone());
    };

    let key = (node_id, slot_name.to_string());
    if chain.contains(&key) {
      let mut names: Vec<String> = chain
        .iter()
        .map(|(id, slot)| self.describe(&SlotRef::new(*id, slot.clone())))
        .collect();
      names.push(self.describe(&SlotRef::new(node_id, slot_name)));
      return Err(GraphError::CyclicInheritance { chain: names });
    }
    chain.push(key);

    let input_name = if inherited_from == INHERIT_FIRST_INPUT {
      node.slot_configuration().first_input_name()
    } else {
      Some(inherited_from)
    };
    let Some(input_name) = input_name else {
      // "*" on a node without inputs: nothing to inherit from.
      return Ok(definition.data_type.clone());
    };
    let Some(input_definition) = node.slot_configuration().slot(input_name, SlotKind::Input)
    else {
      warn!(
        node = %node.name(),
        slot = %slot_name,
        referenced = %input_name,
        "inheritance references a missing input slot, keeping declared type"
      );
      return Ok(definition.data_type.clone());
    };

    let input_ref = SlotRef::new(node_id, input_name);
    let resolved = match self.source_slot_of(&input_ref).cloned() {
      None => input_definition.data_type.clone(),
      Some(source) => self.resolve_output_type_inner(source.node, &source.slot, chain)?,
    };
    Ok(definition.convert_inherited(&resolved))
  }

  /// Re-resolves output slot types starting at `start`, following outgoing
  /// edges while types keep changing. Each node is visited at most once per
  /// call, so diamond topologies terminate. Returns whether any accepted
  /// type changed.
  pub fn update_slot_inheritance(&mut self, start: NodeId) -> Result<bool, GraphError> {
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<NodeId> = VecDeque::from([start]);
    let mut any_changed = false;

    while let Some(id) = queue.pop_front() {
      if !visited.insert(id) {
        continue;
      }
      let output_names: Vec<String> = match self.nodes.get(&id) {
        Some(node) => node
          .output_slots()
          .iter()
          .map(|s| s.name().to_string())
          .collect(),
        None => continue,
      };

      let mut updates: Vec<(String, DataTypeId)> = Vec::with_capacity(output_names.len());
      for name in &output_names {
        let resolved = self.resolved_output_type(id, name)?;
        updates.push((name.clone(), resolved));
      }

      let mut changed = false;
      if let Some(node) = self.nodes.get_mut(&id) {
        for (name, resolved) in updates {
          if let Some(slot) = node.output_slot_mut(&name) {
            if slot.accepted_data_type() != &resolved {
              slot.set_accepted_data_type(resolved);
              changed = true;
            }
          }
        }
      }

      if changed {
        any_changed = true;
        for (source, target) in &self.edges {
          if source.node == id {
            queue.push_back(target.node);
          }
        }
      }
    }

    Ok(any_changed)
  }

  /// Synchronizes a node's slots with its configuration, then propagates
  /// inheritance when anything changed.
  pub fn update_node(&mut self, id: NodeId) -> Result<bool, GraphError> {
    let node = self.nodes.get_mut(&id).ok_or_else(|| GraphError::UnknownNode {
      node: id.to_string(),
    })?;
    let slots_changed = node.update_slots();
    if slots_changed {
      // Edges into removed slots are stale now.
      let nodes = &self.nodes;
      let valid = |r: &SlotRef, kind: SlotKind| {
        nodes
          .get(&r.node)
          .is_some_and(|n| n.slot_configuration().has_slot(&r.slot, kind))
      };
      self
        .edges
        .retain(|(s, t)| valid(s, SlotKind::Output) && valid(t, SlotKind::Input));
    }
    let inheritance_changed = self.update_slot_inheritance(id)?;
    if slots_changed {
      // Replaced slots already carry their new type, so the propagation
      // above sees no delta at this node; downstream still must re-resolve.
      let downstream: HashSet<NodeId> = self
        .edges
        .iter()
        .filter(|(s, _)| s.node == id)
        .map(|(_, t)| t.node)
        .collect();
      for target in downstream {
        self.update_slot_inheritance(target)?;
      }
    }
    Ok(slots_changed || inheritance_changed)
  }

  /// Nodes in a deterministic topological order (Kahn's algorithm over
  /// node-level edges, ties broken by insertion order).
  pub fn topological_order(&self) -> Result<Vec<NodeId>, GraphError> {
    let mut in_degree: HashMap<NodeId, usize> =
      self.node_order.iter().map(|id| (*id, 0)).collect();
    let mut successors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    let mut seen_pairs: HashSet<(NodeId, NodeId)> = HashSet::new();
    for (source, target) in &self.edges {
      if seen_pairs.insert((source.node, target.node)) {
        successors.entry(source.node).or_default().push(target.node);
        if let Some(degree) = in_degree.get_mut(&target.node) {
          *degree += 1;
        }
      }
    }

    let mut order = Vec::with_capacity(self.node_order.len());
    let mut pending: Vec<NodeId> = self.node_order.clone();
    while !pending.is_empty() {
      let ready: Vec<NodeId> = pending
        .iter()
        .filter(|id| in_degree.get(id).copied() == Some(0))
        .copied()
        .collect();
      if ready.is_empty() {
        let stuck = pending[0];
        let name = self
          .nodes
          .get(&stuck)
          .map(|n| n.name().to_string())
          .unwrap_or_else(|| stuck.to_string());
        return Err(GraphError::CycleDetected { node: name });
      }
      for id in &ready {
        order.push(*id);
        in_degree.remove(id);
        if let Some(next) = successors.get(id) {
          for n in next {
            if let Some(degree) = in_degree.get_mut(n) {
              *degree -= 1;
            }
          }
        }
      }
      pending.retain(|id| !ready.contains(id));
    }
    Ok(order)
  }

  /// Replaces each of the node's connected input slots' rows with clones of
  /// the upstream output rows (payloads shared).
  pub fn pull_input_rows(&mut self, id: NodeId) {
    let incoming: Vec<(SlotRef, SlotRef)> = self
      .edges
      .iter()
      .filter(|(_, t)| t.node == id)
      .cloned()
      .collect();
    for (source, target) in incoming {
      let rows = match self
        .nodes
        .get(&source.node)
        .and_then(|n| n.output_slot(&source.slot))
      {
        Some(slot) => slot.rows().to_vec(),
        None => continue,
      };
      let Some(slot) = self
        .nodes
        .get_mut(&target.node)
        .and_then(|n| n.input_slot_mut(&target.slot))
      else {
        continue;
      };
      slot.clear();
      for row in rows {
        slot.push_row(row);
      }
    }
  }

  fn expect_slot(&self, slot_ref: &SlotRef, kind: SlotKind) -> Result<(), GraphError> {
    let node = self
      .nodes
      .get(&slot_ref.node)
      .ok_or_else(|| GraphError::UnknownNode {
        node: slot_ref.node.to_string(),
      })?;
    if !node.slot_configuration().has_slot(&slot_ref.slot, kind) {
      return Err(GraphError::UnknownSlot {
        slot: format!("{}/{}", node.name(), slot_ref.slot),
        kind: kind.to_string(),
      });
    }
    Ok(())
  }

  fn invalid_connection(&self, source: &SlotRef, target: &SlotRef, reason: &str) -> GraphError {
    GraphError::InvalidConnection {
      from: self.describe(source),
      target: self.describe(target),
      reason: reason.to_string(),
    }
  }

  /// `node-name/slot-name`, falling back to the node id.
  fn describe(&self, slot_ref: &SlotRef) -> String {
    match self.nodes.get(&slot_ref.node) {
      Some(node) => format!("{}/{}", node.name(), slot_ref.slot),
      None => format!("{}/{}", slot_ref.node, slot_ref.slot),
    }
  }
}
