//! Fixed shunt admittance to ground.

use nrpf_core::{BusId, NrpfResult};

use crate::sparse::MatrixBuilder;

use super::branch::Coupling;
use super::{Stamp, StampContext};

#[derive(Debug, Clone, PartialEq)]
pub struct Shunt {
    pub name: String,
    pub bus: BusId,
    pub g: f64,
    pub b: f64,
}

impl Shunt {
    pub fn new(name: impl Into<String>, bus: BusId, g: f64, b: f64) -> Self {
        Self {
            name: name.into(),
            bus,
            g,
            b,
        }
    }

    /// Shunt given as MW consumed and Mvar injected at 1 pu on `base_mva`.
    pub fn from_mw_mvar(name: impl Into<String>, bus: BusId, mw: f64, mvar: f64, base_mva: f64) -> Self {
        Self::new(name, bus, mw / base_mva, mvar / base_mva)
    }

    fn coupling(&self, ctx: &StampContext<'_>) -> NrpfResult<Coupling> {
        Ok(Coupling::shunt(Some(ctx.nodes.bus(self.bus)?), self.g, self.b))
    }
}

impl Stamp for Shunt {
    fn stamp_primal(
        &self,
        y: &mut MatrixBuilder,
        _j: &mut [f64],
        _v: &[f64],
        ctx: &StampContext<'_>,
    ) -> NrpfResult<()> {
        self.coupling(ctx)?.stamp_primal(y);
        Ok(())
    }

    fn stamp_dual(
        &self,
        y: &mut MatrixBuilder,
        j: &mut [f64],
        v: &[f64],
        ctx: &StampContext<'_>,
    ) -> NrpfResult<()> {
        self.coupling(ctx)?.stamp_dual(y, j, v)
    }
}
