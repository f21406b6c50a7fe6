//! Circuit construction.

use std::collections::HashMap;

use log::debug;

use crate::error::{Result, SpiceError};

use super::device::{Device, DeviceKind};
use super::subcircuit::SubcircuitDefinition;
use super::types::{BranchMetadata, DeviceId, NodeId};
use super::validate::{
    check_subcircuit_connectivity, check_voltage_cycles, subcircuit_branches, validate_circuit,
};

/// Incrementally assembles a circuit.
///
/// Wiring errors (arity, parameters, tags, ammeter references) are reported
/// by [`add_device`](Self::add_device); topology errors by
/// [`build`](Self::build) and [`build_subcircuit`](Self::build_subcircuit).
#[derive(Debug, Clone)]
pub struct CircuitBuilder {
    node_count: usize,
    initial_voltages: Vec<Option<f64>>,
    devices: Vec<Device>,
    tags: HashMap<String, DeviceId>,
}

impl Default for CircuitBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBuilder {
    /// Empty circuit containing only the ground node.
    pub fn new() -> Self {
        Self {
            node_count: 1,
            initial_voltages: vec![None],
            devices: Vec::new(),
            tags: HashMap::new(),
        }
    }

    /// Nodes referenced so far, ground included.
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn ensure_node(&mut self, node: usize) {
        if node >= self.node_count {
            self.node_count = node + 1;
            self.initial_voltages.resize(self.node_count, None);
        }
    }

    /// Add an untagged device connected to `terminals`.
    pub fn add_device(&mut self, terminals: &[usize], kind: DeviceKind) -> Result<DeviceId> {
        self.push(Device::new(kind, terminals.iter().copied().map(NodeId).collect()))
    }

    /// Add a device that can later be found by `tag`.
    pub fn add_tagged_device(
        &mut self,
        tag: impl Into<String>,
        terminals: &[usize],
        kind: DeviceKind,
    ) -> Result<DeviceId> {
        let device = Device::new(kind, terminals.iter().copied().map(NodeId).collect()).with_tag(tag);
        self.push(device)
    }

    fn push(&mut self, device: Device) -> Result<DeviceId> {
        let id = DeviceId(self.devices.len());
        let label = device.label(id);
        device.validate(&label)?;
        if let Some(ammeter) = device.ammeter() {
            device.check_reference(id, ammeter, &self.devices)?;
        }
        if let Some(tag) = &device.tag {
            if self.tags.contains_key(tag) {
                return Err(SpiceError::DuplicateTag { tag: tag.clone() });
            }
            self.tags.insert(tag.clone(), id);
        }

        for node in &device.terminals {
            self.ensure_node(node.index());
        }
        self.devices.push(device);
        Ok(id)
    }

    /// Set or clear the initial-condition voltage of `node`.
    pub fn set_node_voltage(&mut self, node: usize, voltage: Option<f64>) -> Result<()> {
        if node == 0 {
            return Err(SpiceError::invalid_parameter(
                NodeId::GROUND.to_string(),
                "initial_voltage",
                "ground is fixed at 0 V",
            ));
        }
        if let Some(v) = voltage {
            if !v.is_finite() {
                return Err(SpiceError::invalid_parameter(
                    NodeId(node).to_string(),
                    "initial_voltage",
                    format!("must be finite, got {v}"),
                ));
            }
        }
        self.ensure_node(node);
        self.initial_voltages[node] = voltage;
        Ok(())
    }

    /// Validate the topology and freeze the circuit.
    pub fn build(&self) -> Result<CircuitDefinition> {
        validate_circuit(self.node_count, &self.devices)?;
        debug!(
            "Built circuit with {} nodes and {} devices",
            self.node_count,
            self.devices.len()
        );
        Ok(CircuitDefinition {
            node_count: self.node_count,
            initial_voltages: self.initial_voltages.clone(),
            devices: self.devices.clone(),
            tags: self.tags.clone(),
        })
    }

    /// Freeze the circuit as a subcircuit exposing `terminals`.
    ///
    /// Ground can never be a terminal, it is shared with the enclosing circuit.
    pub fn build_subcircuit(&self, terminals: &[usize]) -> Result<SubcircuitDefinition> {
        if terminals.is_empty() {
            return Err(SpiceError::invalid_terminals("at least one terminal is required"));
        }
        for (i, &terminal) in terminals.iter().enumerate() {
            if terminal == 0 || terminal >= self.node_count {
                return Err(SpiceError::invalid_terminals(format!(
                    "terminal {terminal} must be an inner node in 1..{}",
                    self.node_count
                )));
            }
            if terminals[..i].contains(&terminal) {
                return Err(SpiceError::invalid_terminals(format!(
                    "node {terminal} is listed twice"
                )));
            }
        }

        check_subcircuit_connectivity(self.node_count, &self.devices)?;
        check_voltage_cycles(self.node_count, &self.devices)?;
        let branches = subcircuit_branches(self.node_count, terminals, &self.devices);
        debug!(
            "Built subcircuit with {} terminals, {} inner nodes and {} devices",
            terminals.len(),
            self.node_count,
            self.devices.len()
        );
        Ok(SubcircuitDefinition::new(
            self.node_count,
            terminals.to_vec(),
            self.devices.clone(),
            branches,
        ))
    }
}

/// A validated, immutable circuit.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitDefinition {
    node_count: usize,
    initial_voltages: Vec<Option<f64>>,
    devices: Vec<Device>,
    tags: HashMap<String, DeviceId>,
}

impl CircuitDefinition {
    /// Node count, ground included.
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(id.index())
    }

    /// Handle of the device carrying `tag`.
    pub fn find_device(&self, tag: &str) -> Option<DeviceId> {
        self.tags.get(tag).copied()
    }

    /// Initial-condition voltage of `node`, if one was set.
    pub fn initial_voltage(&self, node: usize) -> Option<f64> {
        self.initial_voltages.get(node).copied().flatten()
    }

    /// Nodes with an initial-condition voltage.
    pub fn initial_conditions(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.initial_voltages
            .iter()
            .enumerate()
            .filter_map(|(node, v)| v.map(|v| (node, v)))
    }

    /// Whether any node voltage or device initial value is set.
    pub fn has_initial_conditions(&self) -> bool {
        self.initial_conditions().next().is_some()
            || self.devices.iter().any(|device| device.kind.has_initial_condition())
    }

    /// Branches of every device, in device order.
    pub fn branch_metadata(&self) -> Vec<BranchMetadata> {
        self.devices
            .iter()
            .enumerate()
            .flat_map(|(i, device)| device.branch_metadata(DeviceId(i)))
            .collect()
    }
}
