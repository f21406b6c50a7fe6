//! Subcircuit definitions.
//!
//! A subcircuit is a validated, immutable device list with its own node
//! numbering. Node 0 is shared with the enclosing circuit, the terminal
//! nodes are bound to the instance's connections and every other inner
//! node becomes a fresh variable per instance.

use super::device::Device;
use super::types::BranchKind;

/// A reusable circuit fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct SubcircuitDefinition {
    node_count: usize,
    terminals: Vec<usize>,
    devices: Vec<Device>,
    /// Terminal-position pairs seen from the outside
    branches: Vec<(usize, usize, BranchKind)>,
}

impl SubcircuitDefinition {
    /// Assemble a definition. Use
    /// [`CircuitBuilder::build_subcircuit`](super::CircuitBuilder::build_subcircuit)
    /// to get one that passed the topology checks.
    pub(crate) fn new(
        node_count: usize,
        terminals: Vec<usize>,
        devices: Vec<Device>,
        branches: Vec<(usize, usize, BranchKind)>,
    ) -> Self {
        Self {
            node_count,
            terminals,
            devices,
            branches,
        }
    }

    /// Inner node count, ground included.
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Inner node of each terminal.
    pub fn terminals(&self) -> &[usize] {
        &self.terminals
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Branches between terminal positions as reported to an enclosing
    /// circuit: voltage-defined pairs are tied to the same potential by
    /// voltage-defined inner branches, current-defined pairs are connected
    /// only through current-defined inner branches.
    pub fn branches(&self) -> &[(usize, usize, BranchKind)] {
        &self.branches
    }

    /// Inner nodes that are neither ground nor a terminal.
    pub fn internal_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        (1..self.node_count).filter(move |n| !self.terminals.contains(n))
    }
}
