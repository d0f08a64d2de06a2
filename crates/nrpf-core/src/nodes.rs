//! Assignment of state variables to positions in the unknown vector.
//!
//! Every physical or dual quantity the solver tracks (node voltage parts,
//! auxiliary branch currents, generator reactive power, Lagrange
//! multipliers, infeasibility currents) receives exactly one dense index in
//! `[0, N)`. Indices are handed out once while the network is built and are
//! never reassigned, so the map doubles as the row layout of the sparse
//! system: the equation owned by an unknown lives in that unknown's row.
//!
//! When infeasibility analysis is enabled, every primal pair is allocated
//! together with its dual pair so the stationarity equations have a row.

use serde::Serialize;

use crate::error::{NrpfError, NrpfResult};
use crate::BusId;

/// What a position in the unknown vector represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownKind {
    /// Real or imaginary node voltage (bus or internal device node)
    Voltage,
    /// Auxiliary branch current (source, transformer primary)
    Current,
    /// Generator reactive output
    ReactivePower,
    /// Lagrange multiplier paired with a primal unknown
    Dual,
    /// Fictitious current injection used by infeasibility analysis
    InfeasibilityCurrent,
}

/// Real/imaginary pair of unknowns plus their optional duals.
///
/// Used both for node voltages (`lr`/`li` are the λ multipliers) and for
/// auxiliary currents (`lr`/`li` are the μ multipliers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePair {
    pub r: usize,
    pub i: usize,
    pub lr: Option<usize>,
    pub li: Option<usize>,
}

/// Single auxiliary unknown plus its optional dual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuxUnknown {
    pub index: usize,
    pub dual: Option<usize>,
}

/// Dense index allocator for the unknown vector.
#[derive(Debug, Clone, Default)]
pub struct NodeMap {
    kinds: Vec<UnknownKind>,
    buses: Vec<NodePair>,
    infeasibility: bool,
}

impl NodeMap {
    pub fn new(infeasibility: bool) -> Self {
        Self {
            kinds: Vec::new(),
            buses: Vec::new(),
            infeasibility,
        }
    }

    /// Whether dual unknowns are allocated alongside primals.
    pub fn infeasibility(&self) -> bool {
        self.infeasibility
    }

    /// Total number of unknowns (and rows) in the system.
    pub fn size(&self) -> usize {
        self.kinds.len()
    }

    pub fn bus_count(&self) -> usize {
        self.buses.len()
    }

    pub fn kind(&self, index: usize) -> Option<UnknownKind> {
        self.kinds.get(index).copied()
    }

    /// Allocate one unknown of the given kind.
    pub fn allocate(&mut self, kind: UnknownKind) -> usize {
        self.kinds.push(kind);
        self.kinds.len() - 1
    }

    /// Allocate a scalar unknown and, under infeasibility analysis, its dual.
    pub fn allocate_aux(&mut self, kind: UnknownKind) -> AuxUnknown {
        let index = self.allocate(kind);
        let dual = self
            .infeasibility
            .then(|| self.allocate(UnknownKind::Dual));
        AuxUnknown { index, dual }
    }

    /// Allocate a real/imaginary pair and, under infeasibility analysis, its duals.
    pub fn allocate_pair(&mut self, kind: UnknownKind) -> NodePair {
        let r = self.allocate(kind);
        let i = self.allocate(kind);
        let (lr, li) = if self.infeasibility {
            (
                Some(self.allocate(UnknownKind::Dual)),
                Some(self.allocate(UnknownKind::Dual)),
            )
        } else {
            (None, None)
        };
        NodePair { r, i, lr, li }
    }

    /// Allocate a real/imaginary pair that never carries duals.
    pub fn allocate_plain_pair(&mut self, kind: UnknownKind) -> NodePair {
        let r = self.allocate(kind);
        let i = self.allocate(kind);
        NodePair {
            r,
            i,
            lr: None,
            li: None,
        }
    }

    /// Register a new bus and allocate its voltage unknowns.
    pub fn add_bus(&mut self) -> BusId {
        let pair = self.allocate_pair(UnknownKind::Voltage);
        self.buses.push(pair);
        BusId::new(self.buses.len() - 1)
    }

    /// Resolve a bus to its unknown indices.
    pub fn bus(&self, id: BusId) -> NrpfResult<NodePair> {
        self.buses
            .get(id.value())
            .copied()
            .ok_or_else(|| NrpfError::Network(format!("unknown bus id {}", id.value())))
    }

    /// Resolve an optional bus; `None` is ground.
    pub fn terminal(&self, id: Option<BusId>) -> NrpfResult<Option<NodePair>> {
        id.map(|id| self.bus(id)).transpose()
    }

    pub fn buses(&self) -> impl Iterator<Item = (BusId, NodePair)> + '_ {
        self.buses
            .iter()
            .enumerate()
            .map(|(idx, pair)| (BusId::new(idx), *pair))
    }

    /// Default voltage-limiting mask: node voltages only.
    pub fn voltage_mask(&self) -> Vec<bool> {
        self.kinds
            .iter()
            .map(|kind| *kind == UnknownKind::Voltage)
            .collect()
    }
}
