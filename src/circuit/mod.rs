//! Circuit definitions and topology validation.
//!
//! This module provides the immutable representation of a circuit that the
//! simulation consumes. A [`CircuitBuilder`] collects devices and rejects
//! miswired ones immediately; [`CircuitBuilder::build`] runs the topology
//! checks and yields a [`CircuitDefinition`].

mod builder;
mod device;
mod graph;
mod subcircuit;
mod types;
mod validate;

pub use builder::{CircuitBuilder, CircuitDefinition};
pub use device::{Device, DeviceKind};
pub use graph::{connected_components, NodeGraph};
pub use subcircuit::SubcircuitDefinition;
pub use types::*;
pub use validate::{
    check_current_cutsets, check_ground_reachability, check_subcircuit_connectivity,
    check_voltage_cycles, subcircuit_branches, validate_circuit,
};
