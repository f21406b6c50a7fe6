//! Core types for circuit representation.

use std::fmt;

/// A node of the circuit, addressed by its index.
/// Node 0 is always ground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl NodeId {
    /// The ground node (always index 0).
    pub const GROUND: NodeId = NodeId(0);

    /// Check if this is the ground node.
    pub fn is_ground(&self) -> bool {
        self.0 == 0
    }

    /// Index into node-indexed tables.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl From<usize> for NodeId {
    fn from(index: usize) -> Self {
        NodeId(index)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ground() {
            write!(f, "GND")
        } else {
            write!(f, "N{}", self.0)
        }
    }
}

/// Handle of a device within its containing device list.
///
/// Definitions and analysis models share the handle: the model built from
/// the definition at position `i` sits at position `i` as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub usize);

impl DeviceId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a branch fixes its electrical quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchKind {
    /// Voltage across the branch is imposed (sources, inductors, VCVS, CCVS)
    VoltageDefined,
    /// Current through the branch is imposed (capacitors, current sources, VCCS, CCCS)
    CurrentDefined,
}

/// A branch between two nodes as seen by the topology checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchMetadata {
    pub a: NodeId,
    pub b: NodeId,
    pub kind: BranchKind,
    pub device: DeviceId,
}

impl BranchMetadata {
    pub fn new(a: NodeId, b: NodeId, kind: BranchKind, device: DeviceId) -> Self {
        Self { a, b, kind, device }
    }
}
