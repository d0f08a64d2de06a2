//! Ideal switch modeled as a large conductance when closed.

use nrpf_core::{BusId, NodeMap, NrpfResult};

use crate::sparse::MatrixBuilder;

use super::branch::Coupling;
use super::capacitor::SwitchState;
use super::{Stamp, StampContext};

/// Conductance of a closed switch or intact fuse.
pub const CLOSED_CONDUCTANCE: f64 = 1e4;

#[derive(Debug, Clone, PartialEq)]
pub struct Switch {
    pub name: String,
    pub from: BusId,
    pub to: BusId,
    pub state: SwitchState,
}

impl Switch {
    pub fn new(name: impl Into<String>, from: BusId, to: BusId, state: SwitchState) -> Self {
        Self {
            name: name.into(),
            from,
            to,
            state,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == SwitchState::Closed
    }

    pub(crate) fn coupling(from: BusId, to: BusId, nodes: &NodeMap) -> NrpfResult<Coupling> {
        Ok(Coupling::series(
            Some(nodes.bus(from)?),
            Some(nodes.bus(to)?),
            CLOSED_CONDUCTANCE,
            0.0,
        ))
    }
}

impl Stamp for Switch {
    fn stamp_primal(
        &self,
        y: &mut MatrixBuilder,
        _j: &mut [f64],
        _v: &[f64],
        ctx: &StampContext<'_>,
    ) -> NrpfResult<()> {
        if self.is_closed() {
            Self::coupling(self.from, self.to, ctx.nodes)?.stamp_primal(y);
        }
        Ok(())
    }

    fn stamp_dual(
        &self,
        y: &mut MatrixBuilder,
        j: &mut [f64],
        v: &[f64],
        ctx: &StampContext<'_>,
    ) -> NrpfResult<()> {
        if self.is_closed() {
            Self::coupling(self.from, self.to, ctx.nodes)?.stamp_dual(y, j, v)?;
        }
        Ok(())
    }
}
