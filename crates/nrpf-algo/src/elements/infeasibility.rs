//! Fictitious current injection used by infeasibility analysis.
//!
//! One per bus. The solver minimizes `Σ |I_inf|²` subject to the network
//! equations; non-zero currents at the solution point at buses where the
//! network cannot be served.

use nrpf_core::{BusId, NodeMap, NodePair, NrpfResult, UnknownKind};

use crate::sparse::MatrixBuilder;

use super::binding::{stamp_dual_equations, Binding};
use super::{handlers, Stamp, StampContext};

#[derive(Debug, Clone, PartialEq)]
pub struct InfeasibilityCurrent {
    pub bus: BusId,
    current: NodePair,
}

impl InfeasibilityCurrent {
    pub fn new(bus: BusId, nodes: &mut NodeMap) -> Self {
        Self {
            bus,
            current: nodes.allocate_plain_pair(UnknownKind::InfeasibilityCurrent),
        }
    }

    pub fn current_unknowns(&self) -> NodePair {
        self.current
    }

    /// Complex power injected by the fictitious current, `(P, Q)`.
    pub fn power(&self, v: &[f64], nodes: &NodeMap) -> NrpfResult<(f64, f64)> {
        let bus = nodes.bus(self.bus)?;
        let (vr, vi) = (v[bus.r], v[bus.i]);
        let (ir, ii) = (v[self.current.r], v[self.current.i]);
        // the current enters the KCL row as a draw, so the injection is −I
        Ok((-(vr * ir + vi * ii), -(vi * ir - vr * ii)))
    }

    fn binding(&self, nodes: &NodeMap) -> NrpfResult<Binding> {
        Ok(Binding::new()
            .self_paired(self.current)
            .multipliers_of(nodes.bus(self.bus)?))
    }
}

impl Stamp for InfeasibilityCurrent {
    fn stamp_primal(
        &self,
        y: &mut MatrixBuilder,
        _j: &mut [f64],
        _v: &[f64],
        ctx: &StampContext<'_>,
    ) -> NrpfResult<()> {
        let bus = ctx.nodes.bus(self.bus)?;
        y.add(bus.r, self.current.r, 1.0);
        y.add(bus.i, self.current.i, 1.0);
        Ok(())
    }

    fn stamp_dual(
        &self,
        y: &mut MatrixBuilder,
        j: &mut [f64],
        v: &[f64],
        ctx: &StampContext<'_>,
    ) -> NrpfResult<()> {
        stamp_dual_equations(
            handlers::infeasibility()?,
            &[],
            &self.binding(ctx.nodes)?,
            y,
            j,
            v,
        );
        Ok(())
    }
}
