//! Circuit topology validation.
//!
//! Checks run before any simulation:
//! - every node has a path to ground, treating all terminals of a device as
//!   connected to each other
//! - voltage-defined branches do not form a loop
//! - current-defined branches are never the only link between two parts
//!
//! Subcircuits additionally need all inner nodes to form a single
//! partition when ground is disregarded.

use log::warn;

use crate::error::{Result, SpiceError};

use super::device::Device;
use super::graph::{connected_components, node_sets, NodeGraph};
use super::types::{BranchKind, DeviceId, NodeId};

/// Run all checks on a complete circuit.
pub fn validate_circuit(node_count: usize, devices: &[Device]) -> Result<()> {
    check_ground_reachability(node_count, devices)?;
    check_voltage_cycles(node_count, devices)?;
    check_current_cutsets(node_count, devices)
}

/// Every node must reach ground through some device.
pub fn check_ground_reachability(node_count: usize, devices: &[Device]) -> Result<()> {
    let mut graph = NodeGraph::new(node_count);
    for (i, device) in devices.iter().enumerate() {
        for (a, b) in device.terminal_pairs() {
            graph.connect(a, b, DeviceId(i));
        }
    }

    let nodes: Vec<usize> = graph
        .reachable_from(NodeId::GROUND)
        .into_iter()
        .enumerate()
        .filter_map(|(node, reached)| (!reached).then_some(node))
        .collect();
    if nodes.is_empty() {
        Ok(())
    } else {
        warn!("Nodes {nodes:?} have no DC path to ground");
        Err(SpiceError::NoDcPathToGround { nodes })
    }
}

/// Voltage-defined branches must not close a loop.
pub fn check_voltage_cycles(node_count: usize, devices: &[Device]) -> Result<()> {
    let mut sets = node_sets(node_count, std::iter::empty());
    let mut graph = NodeGraph::new(node_count);

    for (i, device) in devices.iter().enumerate() {
        let id = DeviceId(i);
        for branch in device.branch_metadata(id) {
            if branch.kind != BranchKind::VoltageDefined {
                continue;
            }
            if sets.union(branch.a.index(), branch.b.index()) {
                graph.connect(branch.a, branch.b, id);
                continue;
            }
            let mut cycle = graph.path_devices(branch.a, branch.b).unwrap_or_default();
            cycle.push(id);
            warn!("Voltage-defined branches form a cycle through {cycle:?}");
            return Err(SpiceError::VoltageBranchCycle { devices: cycle });
        }
    }
    Ok(())
}

/// Pairs that stay connected once current-defined branches are removed.
fn dc_edges(devices: &[Device]) -> Vec<(usize, usize)> {
    let mut edges = Vec::new();
    for (i, device) in devices.iter().enumerate() {
        let current: Vec<(NodeId, NodeId)> = device
            .branch_metadata(DeviceId(i))
            .into_iter()
            .filter(|b| b.kind == BranchKind::CurrentDefined)
            .map(|b| (b.a, b.b))
            .collect();
        for (a, b) in device.terminal_pairs() {
            if !current.contains(&(a, b)) && !current.contains(&(b, a)) {
                edges.push((a.index(), b.index()));
            }
        }
    }
    edges
}

/// Current-defined branches must not be the only link between two parts.
pub fn check_current_cutsets(node_count: usize, devices: &[Device]) -> Result<()> {
    let sets = node_sets(node_count, dc_edges(devices));

    let mut cutset = Vec::new();
    for (i, device) in devices.iter().enumerate() {
        let id = DeviceId(i);
        let crosses = device.branch_metadata(id).iter().any(|b| {
            b.kind == BranchKind::CurrentDefined && !sets.equiv(b.a.index(), b.b.index())
        });
        if crosses {
            cutset.push(id);
        }
    }

    if cutset.is_empty() {
        Ok(())
    } else {
        warn!("Current-defined branches {cutset:?} form a cutset");
        Err(SpiceError::CurrentBranchCutset { devices: cutset })
    }
}

/// Inner nodes of a subcircuit must form one partition, ground disregarded.
pub fn check_subcircuit_connectivity(node_count: usize, devices: &[Device]) -> Result<()> {
    let edges = devices.iter().flat_map(|device| {
        device
            .terminal_pairs()
            .filter(|(a, b)| !a.is_ground() && !b.is_ground())
            .map(|(a, b)| (a.index(), b.index()))
    });
    let components = connected_components(node_count, 1..node_count, edges);
    if components.len() == 1 {
        Ok(())
    } else {
        warn!("Subcircuit splits into {} partitions", components.len());
        Err(SpiceError::NotConnectedSubcircuit { components })
    }
}

/// Relationship between every pair of subcircuit terminals as seen from outside.
///
/// Pairs tied together by voltage-defined branches are voltage-defined.
/// Pairs that fall apart once current-defined branches are removed are
/// current-defined. Other pairs are connected through ordinary devices and
/// are not reported.
pub fn subcircuit_branches(
    node_count: usize,
    terminals: &[usize],
    devices: &[Device],
) -> Vec<(usize, usize, BranchKind)> {
    let voltage_edges = devices.iter().enumerate().flat_map(|(i, device)| {
        device
            .branch_metadata(DeviceId(i))
            .into_iter()
            .filter(|b| b.kind == BranchKind::VoltageDefined)
            .map(|b| (b.a.index(), b.b.index()))
    });
    let tied = node_sets(node_count, voltage_edges);
    let connected = node_sets(node_count, dc_edges(devices));

    let mut branches = Vec::new();
    for (i, &a) in terminals.iter().enumerate() {
        for (j, &b) in terminals.iter().enumerate().skip(i + 1) {
            if tied.equiv(a, b) {
                branches.push((i, j, BranchKind::VoltageDefined));
            } else if !connected.equiv(a, b) {
                branches.push((i, j, BranchKind::CurrentDefined));
            }
        }
    }
    branches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::DeviceKind;

    fn device(kind: DeviceKind, nodes: &[usize]) -> Device {
        Device::new(kind, nodes.iter().copied().map(NodeId).collect())
    }

    #[test]
    fn test_unreachable_node_is_named() {
        let devices = vec![
            device(DeviceKind::resistor(1.0), &[1, 0]),
            device(DeviceKind::resistor(1.0), &[3, 0]),
        ];
        assert_eq!(
            check_ground_reachability(4, &devices),
            Err(SpiceError::NoDcPathToGround { nodes: vec![2] })
        );
    }

    #[test]
    fn test_parallel_voltage_sources_form_cycle() {
        let devices = vec![
            device(DeviceKind::dc_voltage(1.0), &[1, 0]),
            device(DeviceKind::resistor(1.0), &[1, 2]),
            device(DeviceKind::inductor(1e-3), &[2, 0]),
            device(DeviceKind::inductor(1e-3), &[1, 2]),
        ];
        assert_eq!(
            check_voltage_cycles(3, &devices),
            Err(SpiceError::VoltageBranchCycle {
                devices: vec![DeviceId(0), DeviceId(2), DeviceId(3)]
            })
        );
    }

    #[test]
    fn test_series_capacitors_leave_floating_node() {
        let devices = vec![
            device(DeviceKind::dc_voltage(1.0), &[1, 0]),
            device(DeviceKind::capacitor(1e-6), &[1, 2]),
            device(DeviceKind::capacitor(1e-6), &[2, 0]),
        ];
        assert!(check_ground_reachability(3, &devices).is_ok());
        assert_eq!(
            check_current_cutsets(3, &devices),
            Err(SpiceError::CurrentBranchCutset {
                devices: vec![DeviceId(1), DeviceId(2)]
            })
        );
    }

    #[test]
    fn test_bridged_current_branch_is_accepted() {
        let devices = vec![
            device(DeviceKind::dc_current(1.0), &[0, 1]),
            device(DeviceKind::resistor(1.0), &[1, 0]),
            device(DeviceKind::capacitor(1e-6), &[1, 0]),
        ];
        assert!(validate_circuit(2, &devices).is_ok());
    }

    #[test]
    fn test_subcircuit_partitions() {
        let devices = vec![
            device(DeviceKind::resistor(1.0), &[1, 3]),
            device(DeviceKind::resistor(1.0), &[2, 4]),
            device(DeviceKind::resistor(1.0), &[4, 0]),
        ];
        assert_eq!(
            check_subcircuit_connectivity(5, &devices),
            Err(SpiceError::NotConnectedSubcircuit {
                components: vec![vec![1, 3], vec![2, 4]]
            })
        );
    }

    #[test]
    fn test_subcircuit_branch_reduction() {
        // Terminals 1, 2, 3: a source ties 1 to 2, a capacitor is the only link to 3
        let devices = vec![
            device(DeviceKind::dc_voltage(1.0), &[1, 4]),
            device(DeviceKind::inductor(1e-3), &[4, 2]),
            device(DeviceKind::capacitor(1e-6), &[2, 3]),
            device(DeviceKind::resistor(1.0), &[3, 5]),
        ];
        let branches = subcircuit_branches(6, &[1, 2, 3], &devices);
        assert_eq!(
            branches,
            vec![
                (0, 1, BranchKind::VoltageDefined),
                (0, 2, BranchKind::CurrentDefined),
                (1, 2, BranchKind::CurrentDefined),
            ]
        );
    }
}
