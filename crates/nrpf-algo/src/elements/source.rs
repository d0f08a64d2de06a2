//! Ideal voltage source (slack bus or infinite-source phase).
//!
//! The source current `I` is an extra unknown pair; it enters the bus KCL
//! rows and its own rows pin the bus voltage to the setpoint. Sources are
//! never scaled by the homotopy factor.

use nrpf_core::{BusId, NodeMap, NodePair, NrpfResult, UnknownKind};

use crate::sparse::MatrixBuilder;

use super::binding::{stamp_dual_equations, Binding};
use super::{handlers, Stamp, StampContext};

#[derive(Debug, Clone, PartialEq)]
pub struct VoltageSource {
    pub name: String,
    pub bus: BusId,
    pub vr_set: f64,
    pub vi_set: f64,
    current: NodePair,
}

impl VoltageSource {
    pub fn new(
        name: impl Into<String>,
        bus: BusId,
        vr_set: f64,
        vi_set: f64,
        nodes: &mut NodeMap,
    ) -> Self {
        Self {
            name: name.into(),
            bus,
            vr_set,
            vi_set,
            current: nodes.allocate_pair(UnknownKind::Current),
        }
    }

    /// Source holding `magnitude ∠ angle` (radians).
    pub fn polar(
        name: impl Into<String>,
        bus: BusId,
        magnitude: f64,
        angle: f64,
        nodes: &mut NodeMap,
    ) -> Self {
        Self::new(name, bus, magnitude * angle.cos(), magnitude * angle.sin(), nodes)
    }

    /// Unknowns of the current flowing from the bus into the source.
    pub fn current_unknowns(&self) -> NodePair {
        self.current
    }

    /// Complex power delivered to the network, `(P, Q)`.
    pub fn power_output(&self, v: &[f64], nodes: &NodeMap) -> NrpfResult<(f64, f64)> {
        let bus = nodes.bus(self.bus)?;
        let (vr, vi) = (v[bus.r], v[bus.i]);
        let (ir, ii) = (v[self.current.r], v[self.current.i]);
        Ok((-(vr * ir + vi * ii), -(vi * ir - vr * ii)))
    }
}

impl Stamp for VoltageSource {
    fn stamp_primal(
        &self,
        y: &mut MatrixBuilder,
        j: &mut [f64],
        _v: &[f64],
        ctx: &StampContext<'_>,
    ) -> NrpfResult<()> {
        let bus = ctx.nodes.bus(self.bus)?;
        let cur = self.current;

        y.add(bus.r, cur.r, 1.0);
        y.add(bus.i, cur.i, 1.0);

        y.add(cur.r, bus.r, 1.0);
        y.add(cur.i, bus.i, 1.0);
        j[cur.r] += self.vr_set;
        j[cur.i] += self.vi_set;
        Ok(())
    }

    fn stamp_dual(
        &self,
        y: &mut MatrixBuilder,
        j: &mut [f64],
        v_previous: &[f64],
        ctx: &StampContext<'_>,
    ) -> NrpfResult<()> {
        let binding = Binding::new()
            .pair(Some(ctx.nodes.bus(self.bus)?))
            .pair(Some(self.current));
        stamp_dual_equations(
            handlers::voltage_source()?,
            &[self.vr_set, self.vi_set],
            &binding,
            y,
            j,
            v_previous,
        );
        Ok(())
    }
}
