//! # Element stampers
//!
//! Every network device contributes to the Newton system `Y·x = J` through
//! the [`Stamp`] trait:
//!
//! - `stamp_primal`: the device's physical equations (KCL contributions and
//!   any constraint rows it owns), linearized around `v_previous` when
//!   nonlinear.
//! - `stamp_dual`: the stationarity equations of the augmented Lagrangian,
//!   only used with infeasibility analysis.
//! - `calculate_residuals`: `Y·v − J` of the full-strength model at `v`,
//!   keyed by row.
//!
//! Devices are collected in the [`Element`] enum. Linear devices are
//! *invariant*: stamped once per solve. Nonlinear or switchable devices are
//! *variable*: re-stamped every iteration.

use std::collections::HashMap;

use nrpf_core::{BusId, NodeMap, NrpfResult};

use crate::sparse::MatrixBuilder;

pub mod binding;
pub mod branch;
pub mod capacitor;
pub mod fuse;
pub mod generator;
pub mod handlers;
pub mod infeasibility;
pub mod line;
pub mod load;
pub mod regulator;
pub mod shunt;
pub mod source;
pub mod switch;
pub mod transformer;

pub use branch::Coupling;
pub use capacitor::{Capacitor, CapacitorMode, SwitchState};
pub use fuse::Fuse;
pub use generator::Generator;
pub use infeasibility::InfeasibilityCurrent;
pub use line::TransmissionLine;
pub use load::{ImpedanceLoad, PqLoad};
pub use regulator::{Regulator, RegulatorType};
pub use shunt::Shunt;
pub use source::VoltageSource;
pub use switch::Switch;
pub use transformer::Transformer;

/// Equation values keyed by row.
pub type Residuals = HashMap<usize, f64>;

/// Read-only state shared by all stampers during one stamping pass.
#[derive(Debug, Clone, Copy)]
pub struct StampContext<'a> {
    pub nodes: &'a NodeMap,
    /// Homotopy factor in `(0, 1]` applied to constant-power injections
    pub tx_factor: f64,
}

impl<'a> StampContext<'a> {
    pub fn new(nodes: &'a NodeMap, tx_factor: f64) -> Self {
        Self { nodes, tx_factor }
    }

    /// Context of the full-strength model.
    pub fn full(nodes: &'a NodeMap) -> Self {
        Self::new(nodes, 1.0)
    }
}

pub trait Stamp {
    fn stamp_primal(
        &self,
        y: &mut MatrixBuilder,
        j: &mut [f64],
        v_previous: &[f64],
        ctx: &StampContext<'_>,
    ) -> NrpfResult<()>;

    fn stamp_dual(
        &self,
        y: &mut MatrixBuilder,
        j: &mut [f64],
        v_previous: &[f64],
        ctx: &StampContext<'_>,
    ) -> NrpfResult<()>;

    /// Contribution of this device to `Y·v − J` at `v`.
    ///
    /// Linearizing at `v` and evaluating at the same point reproduces the
    /// nonlinear equation exactly, so the stamps double as the residual
    /// model.
    fn calculate_residuals(&self, v: &[f64], nodes: &NodeMap) -> NrpfResult<Residuals> {
        let ctx = StampContext::full(nodes);
        let mut y = MatrixBuilder::new(nodes.size());
        let mut j = vec![0.0; nodes.size()];
        self.stamp_primal(&mut y, &mut j, v, &ctx)?;
        if nodes.infeasibility() {
            self.stamp_dual(&mut y, &mut j, v, &ctx)?;
        }
        Ok(residuals_of(&y, &j, v))
    }
}

/// `Y·v − J` over the rows touched by `y` or by a non-zero entry of `j`.
pub fn residuals_of(y: &MatrixBuilder, j: &[f64], v: &[f64]) -> Residuals {
    let mut out = Residuals::new();
    for (row, col, value) in y.triplets() {
        *out.entry(row).or_insert(0.0) += value * v[col];
    }
    for (row, &rhs) in j.iter().enumerate() {
        if rhs != 0.0 {
            *out.entry(row).or_insert(0.0) -= rhs;
        }
    }
    out
}

#[inline]
pub(crate) fn add_y(y: &mut MatrixBuilder, row: Option<usize>, col: Option<usize>, value: f64) {
    if let (Some(row), Some(col)) = (row, col) {
        y.add(row, col, value);
    }
}

#[inline]
pub(crate) fn add_j(j: &mut [f64], row: Option<usize>, value: f64) {
    if let Some(row) = row {
        j[row] += value;
    }
}

/// Every device the network model knows how to stamp.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Line(TransmissionLine),
    Transformer(Transformer),
    Regulator(Regulator),
    Shunt(Shunt),
    Capacitor(Capacitor),
    Switch(Switch),
    Fuse(Fuse),
    PqLoad(PqLoad),
    ImpedanceLoad(ImpedanceLoad),
    Generator(Generator),
    Source(VoltageSource),
    Infeasibility(InfeasibilityCurrent),
}

macro_rules! dispatch {
    ($self:expr, $inner:ident => $body:expr) => {
        match $self {
            Element::Line($inner) => $body,
            Element::Transformer($inner) => $body,
            Element::Regulator($inner) => $body,
            Element::Shunt($inner) => $body,
            Element::Capacitor($inner) => $body,
            Element::Switch($inner) => $body,
            Element::Fuse($inner) => $body,
            Element::PqLoad($inner) => $body,
            Element::ImpedanceLoad($inner) => $body,
            Element::Generator($inner) => $body,
            Element::Source($inner) => $body,
            Element::Infeasibility($inner) => $body,
        }
    };
}

impl Element {
    /// Re-stamped every iteration (nonlinear or switchable between solves).
    pub fn is_variable(&self) -> bool {
        matches!(
            self,
            Element::PqLoad(_) | Element::Capacitor(_) | Element::Fuse(_) | Element::Generator(_)
        )
    }

    pub fn name(&self) -> &str {
        match self {
            Element::Infeasibility(_) => "infeasibility current",
            Element::Line(e) => &e.name,
            Element::Transformer(e) => &e.name,
            Element::Regulator(e) => &e.name,
            Element::Shunt(e) => &e.name,
            Element::Capacitor(e) => &e.name,
            Element::Switch(e) => &e.name,
            Element::Fuse(e) => &e.name,
            Element::PqLoad(e) => &e.name,
            Element::ImpedanceLoad(e) => &e.name,
            Element::Generator(e) => &e.name,
            Element::Source(e) => &e.name,
        }
    }

    /// Bus pairs this device electrically connects (for island detection).
    pub fn connections(&self) -> Vec<(BusId, BusId)> {
        match self {
            Element::Line(line) => line
                .from
                .iter()
                .copied()
                .zip(line.to.iter().copied())
                .collect(),
            Element::Transformer(t) => vec![(t.from, t.to)],
            Element::Regulator(r) => vec![(r.from, r.to)],
            Element::Switch(s) if s.is_closed() => vec![(s.from, s.to)],
            Element::Fuse(f) if f.is_closed() => vec![(f.from, f.to)],
            Element::Capacitor(c) if c.is_closed() => c.to.map(|to| (c.from, to)).into_iter().collect(),
            Element::PqLoad(l) => l.to.map(|to| (l.from, to)).into_iter().collect(),
            Element::ImpedanceLoad(l) => l.to.map(|to| (l.from, to)).into_iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Bus held at a fixed voltage by this device, if any.
    pub fn source_bus(&self) -> Option<BusId> {
        match self {
            Element::Source(s) => Some(s.bus),
            Element::Generator(g) => Some(g.bus),
            _ => None,
        }
    }

    /// Between-solve control action; `true` when the device changed state.
    pub fn try_adjust(&mut self, v: &[f64], nodes: &NodeMap) -> NrpfResult<bool> {
        match self {
            Element::Capacitor(c) => c.try_adjust(v, nodes),
            Element::Fuse(f) => f.try_adjust(v, nodes),
            _ => Ok(false),
        }
    }
}

impl Stamp for Element {
    fn stamp_primal(
        &self,
        y: &mut MatrixBuilder,
        j: &mut [f64],
        v_previous: &[f64],
        ctx: &StampContext<'_>,
    ) -> NrpfResult<()> {
        dispatch!(self, e => e.stamp_primal(y, j, v_previous, ctx))
    }

    fn stamp_dual(
        &self,
        y: &mut MatrixBuilder,
        j: &mut [f64],
        v_previous: &[f64],
        ctx: &StampContext<'_>,
    ) -> NrpfResult<()> {
        dispatch!(self, e => e.stamp_dual(y, j, v_previous, ctx))
    }

    fn calculate_residuals(&self, v: &[f64], nodes: &NodeMap) -> NrpfResult<Residuals> {
        dispatch!(self, e => e.calculate_residuals(v, nodes))
    }
}
