//! Core data model: slots, rows, annotations, batches, parameter sets.
//!
//! One file per type, matching how nodes consume them: a [SlotDefinition]
//! declares a port, a [DataSlot] is its runtime container of [DataRow]s,
//! and a [DataBatch] groups row indices across slots for one unit of work.

mod annotation;
mod data_batch;
mod data_row;
mod data_slot;
mod data_type;
mod node_id;
mod parameter_set;
mod slot_definition;

pub use annotation::Annotation;
pub use data_batch::{merge_annotation_values, BatchInput, BatchOutput, DataBatch};
pub use data_row::DataRow;
pub use data_slot::DataSlot;
pub use data_type::DataTypeId;
pub use node_id::NodeId;
pub use parameter_set::ParameterSet;
pub use slot_definition::{SlotDefinition, SlotKind, INHERIT_FIRST_INPUT};
