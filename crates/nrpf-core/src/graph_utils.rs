//! Topology helpers used to sanity-check a network before solving.
//!
//! Buses become graph nodes and every closed conducting element becomes an
//! edge. An island with no voltage source has no voltage reference and
//! leaves the nodal system singular, so these helpers are run by the
//! network validator before any stamping happens.

use petgraph::algo::connected_components;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::Bfs;
use std::collections::HashSet;

use crate::BusId;

/// One connected group of buses, numbered in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Island {
    pub island_id: usize,
    pub buses: Vec<BusId>,
}

/// Undirected bus connectivity graph.
#[derive(Debug, Default)]
pub struct Topology {
    graph: UnGraph<BusId, ()>,
}

impl Topology {
    /// Create a topology over `bus_count` buses numbered `0..bus_count`.
    pub fn new(bus_count: usize) -> Self {
        let mut graph = UnGraph::with_capacity(bus_count, bus_count);
        for idx in 0..bus_count {
            graph.add_node(BusId::new(idx));
        }
        Self { graph }
    }

    /// Connect two buses. Unknown ids are ignored; the node map reports them.
    pub fn connect(&mut self, a: BusId, b: BusId) {
        let count = self.graph.node_count();
        if a.value() < count && b.value() < count && a != b {
            self.graph
                .add_edge(NodeIndex::new(a.value()), NodeIndex::new(b.value()), ());
        }
    }

    pub fn component_count(&self) -> usize {
        connected_components(&self.graph)
    }

    /// Labels connected components via breadth-first search.
    pub fn islands(&self) -> Vec<Island> {
        let mut visited = HashSet::new();
        let mut islands = Vec::new();
        for start in self.graph.node_indices() {
            if visited.contains(&start) {
                continue;
            }
            let mut members = Vec::new();
            let mut bfs = Bfs::new(&self.graph, start);
            while let Some(node) = bfs.next(&self.graph) {
                visited.insert(node);
                members.push(self.graph[node]);
            }
            members.sort_by_key(|bus| bus.value());
            islands.push(Island {
                island_id: islands.len(),
                buses: members,
            });
        }
        islands
    }

    /// Islands that contain none of the given source buses.
    pub fn unsourced_islands(&self, sources: &[BusId]) -> Vec<Island> {
        let sources: HashSet<BusId> = sources.iter().copied().collect();
        self.islands()
            .into_iter()
            .filter(|island| !island.buses.iter().any(|bus| sources.contains(bus)))
            .collect()
    }
}
