//! Node connectivity graphs used by the topology checks.

use std::collections::VecDeque;

use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;
use petgraph::visit::{Bfs, EdgeRef};

use super::types::{DeviceId, NodeId};

/// Undirected graph over circuit nodes. Each edge remembers the device
/// that links its two nodes.
#[derive(Debug, Clone)]
pub struct NodeGraph {
    graph: UnGraph<(), DeviceId>,
}

impl NodeGraph {
    /// Graph with `node_count` isolated nodes.
    pub fn new(node_count: usize) -> Self {
        let mut graph = UnGraph::with_capacity(node_count, node_count);
        for _ in 0..node_count {
            graph.add_node(());
        }
        Self { graph }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Link two nodes through `device`.
    pub fn connect(&mut self, a: NodeId, b: NodeId, device: DeviceId) {
        self.graph
            .add_edge(NodeIndex::new(a.index()), NodeIndex::new(b.index()), device);
    }

    /// Nodes reached by a breadth-first search from `start`.
    pub fn reachable_from(&self, start: NodeId) -> Vec<bool> {
        let mut reached = vec![false; self.graph.node_count()];
        if start.index() >= reached.len() {
            return reached;
        }
        let mut bfs = Bfs::new(&self.graph, NodeIndex::new(start.index()));
        while let Some(node) = bfs.next(&self.graph) {
            reached[node.index()] = true;
        }
        reached
    }

    /// Devices along a shortest path between two nodes, each one the edge
    /// the search actually crossed.
    pub fn path_devices(&self, from: NodeId, to: NodeId) -> Option<Vec<DeviceId>> {
        let count = self.graph.node_count();
        if from.index() >= count || to.index() >= count {
            return None;
        }
        let start = NodeIndex::new(from.index());
        let goal = NodeIndex::new(to.index());

        // Predecessor and edge that first reached each node
        let mut via: Vec<Option<(NodeIndex, EdgeIndex)>> = vec![None; count];
        let mut visited = vec![false; count];
        visited[start.index()] = true;
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            if node == goal {
                break;
            }
            for edge in self.graph.edges(node) {
                let next = if edge.source() == node { edge.target() } else { edge.source() };
                if !visited[next.index()] {
                    visited[next.index()] = true;
                    via[next.index()] = Some((node, edge.id()));
                    queue.push_back(next);
                }
            }
        }
        if !visited[goal.index()] {
            return None;
        }

        let mut devices = Vec::new();
        let mut node = goal;
        while let Some((previous, edge)) = via[node.index()] {
            devices.push(self.graph[edge]);
            node = previous;
        }
        devices.reverse();
        Some(devices)
    }
}

/// Group `nodes` into connected components under `edges`.
///
/// Components are listed by their smallest node, each sorted ascending.
pub fn connected_components(
    node_count: usize,
    nodes: impl IntoIterator<Item = usize>,
    edges: impl IntoIterator<Item = (usize, usize)>,
) -> Vec<Vec<usize>> {
    let sets = node_sets(node_count, edges);
    let mut nodes: Vec<usize> = nodes.into_iter().collect();
    nodes.sort_unstable();
    nodes.dedup();

    let mut components: Vec<(usize, Vec<usize>)> = Vec::new();
    for node in nodes {
        let root = sets.find(node);
        match components.iter_mut().find(|(r, _)| *r == root) {
            Some((_, members)) => members.push(node),
            None => components.push((root, vec![node])),
        }
    }
    components.into_iter().map(|(_, members)| members).collect()
}

/// Disjoint sets of nodes merged along `edges`.
pub fn node_sets(node_count: usize, edges: impl IntoIterator<Item = (usize, usize)>) -> UnionFind<usize> {
    let mut sets = UnionFind::new(node_count);
    for (a, b) in edges {
        sets.union(a, b);
    }
    sets
}
