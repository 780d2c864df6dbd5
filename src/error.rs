//! Error types for graph validation and pipeline runs.
//!
//! Structural problems (bad wiring, bad slot configuration) surface as
//! [GraphError] before any node executes. Failures during a run surface as
//! [RunError].

use thiserror::Error;

/// Errors detected while building or validating a graph and its slot
/// configurations. These abort before any node-execution side effects.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
  /// Output-type inheritance follows a cycle. `chain` lists the visited
  /// `node/slot` references in resolution order, ending at the repeat.
  #[error("cyclic slot inheritance: {}", chain.join(" -> "))]
  CyclicInheritance { chain: Vec<String> },

  /// `slot` is formatted as `node/slot` when the owning node is known.
  #[error("no {kind} slot named '{slot}'")]
  UnknownSlot { slot: String, kind: String },

  #[error("unknown node '{node}'")]
  UnknownNode { node: String },

  #[error("a {kind} slot named '{slot}' already exists")]
  SlotAlreadyExists { slot: String, kind: String },

  #[error("slot configuration is sealed against {operation} of {kind} slots")]
  SlotSealed { operation: String, kind: String },

  #[error("data type '{data_type}' is not allowed for {kind} slots here")]
  TypeNotAllowed { data_type: String, kind: String },

  #[error("cannot add {kind} slot '{slot}': limit of {limit} slots reached")]
  SlotLimitReached {
    slot: String,
    kind: String,
    limit: usize,
  },

  #[error("invalid connection {from} -> {target}: {reason}")]
  InvalidConnection {
    from: String,
    target: String,
    reason: String,
  },

  /// The graph's edges contain a cycle, so no topological order exists.
  #[error("graph contains a cycle involving node '{node}'")]
  CycleDetected { node: String },

  #[error("no registered node declaration with id '{id}'")]
  UnknownDeclaration { id: String },
}

/// Errors raised while running a node's batch pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunError {
  /// A batch is missing rows for one or more input slots and skipping is
  /// disabled. A configuration problem, not a transient fault.
  #[error("node '{node}' produced an incomplete batch: missing rows for {}", missing_slots.join(", "))]
  IncompleteBatch {
    node: String,
    missing_slots: Vec<String>,
  },

  /// The node's execution callback failed.
  #[error("node '{node}' failed: {message}")]
  Execution { node: String, message: String },

  #[error(transparent)]
  Graph(#[from] GraphError),
}
