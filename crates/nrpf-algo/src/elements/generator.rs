//! PV generator: fixed active injection and voltage magnitude.
//!
//! The reactive output `Q` is an extra unknown; its row holds
//! `Vr² + Vi² − Vset² = 0`.

use nrpf_core::{AuxUnknown, BusId, NodeMap, NrpfResult, UnknownKind};

use crate::sparse::MatrixBuilder;

use super::binding::{stamp_dual_equations, Binding};
use super::load::PqLinearization;
use super::{handlers, Stamp, StampContext};

#[derive(Debug, Clone, PartialEq)]
pub struct Generator {
    pub name: String,
    pub bus: BusId,
    /// Active power injection (per unit)
    pub p: f64,
    /// Voltage magnitude setpoint (per unit)
    pub v_set: f64,
    q: AuxUnknown,
}

impl Generator {
    pub fn new(name: impl Into<String>, bus: BusId, p: f64, v_set: f64, nodes: &mut NodeMap) -> Self {
        Self {
            name: name.into(),
            bus,
            p,
            v_set,
            q: nodes.allocate_aux(UnknownKind::ReactivePower),
        }
    }

    /// Unknown holding the reactive output.
    pub fn q_unknown(&self) -> AuxUnknown {
        self.q
    }

    /// Initial value of the reactive output.
    pub fn q_initial(&self) -> f64 {
        0.0
    }
}

impl Stamp for Generator {
    fn stamp_primal(
        &self,
        y: &mut MatrixBuilder,
        j: &mut [f64],
        v_previous: &[f64],
        ctx: &StampContext<'_>,
    ) -> NrpfResult<()> {
        let bus = ctx.nodes.bus(self.bus)?;
        let (vr, vi) = (v_previous[bus.r], v_previous[bus.i]);
        let q = v_previous[self.q.index];
        let p = self.p * ctx.tx_factor;
        let d = vr * vr + vi * vi;

        // injection is the negated constant-power draw at the same P, Q
        let lin = PqLinearization::at(p, q, vr, vi);
        let (gr, gi) = (-lin.fr, -lin.fi);
        let (dgr_dq, dgi_dq) = (-vi / d, vr / d);

        y.add(bus.r, bus.r, -lin.dfr_dvr);
        y.add(bus.r, bus.i, -lin.dfr_dvi);
        y.add(bus.r, self.q.index, dgr_dq);
        y.add(bus.i, bus.r, -lin.dfi_dvr);
        y.add(bus.i, bus.i, -lin.dfi_dvi);
        y.add(bus.i, self.q.index, dgi_dq);
        j[bus.r] += -lin.dfr_dvr * vr - lin.dfr_dvi * vi + dgr_dq * q - gr;
        j[bus.i] += -lin.dfi_dvr * vr - lin.dfi_dvi * vi + dgi_dq * q - gi;

        y.add(self.q.index, bus.r, 2.0 * vr);
        y.add(self.q.index, bus.i, 2.0 * vi);
        j[self.q.index] += vr * vr + vi * vi + self.v_set * self.v_set;
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
            .aux(self.q);
        stamp_dual_equations(
            handlers::generator()?,
            &[self.p * ctx.tx_factor, self.v_set],
            &binding,
            y,
            j,
            v_previous,
        );
        Ok(())
    }
}
