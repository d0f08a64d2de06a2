//! Fuse: a closed switch that blows open above its current rating.

use tracing::warn;

use nrpf_core::{BusId, NodeMap, NrpfError, NrpfResult};

use crate::sparse::MatrixBuilder;

use super::capacitor::SwitchState;
use super::switch::Switch;
use super::{Stamp, StampContext};

#[derive(Debug, Clone, PartialEq)]
pub struct Fuse {
    pub name: String,
    pub from: BusId,
    pub to: BusId,
    /// Current magnitude above which the fuse blows
    pub rating: f64,
    pub state: SwitchState,
}

impl Fuse {
    pub fn new(name: impl Into<String>, from: BusId, to: BusId, rating: f64) -> NrpfResult<Self> {
        let name = name.into();
        if rating.is_nan() || rating <= 0.0 {
            return Err(NrpfError::Modeling(format!(
                "fuse {}: rating must be positive, got {}",
                name, rating
            )));
        }
        Ok(Self {
            name,
            from,
            to,
            rating,
            state: SwitchState::Closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.state == SwitchState::Closed
    }

    /// Current magnitude through the fuse at `v`; zero once blown.
    pub fn current_magnitude(&self, v: &[f64], nodes: &NodeMap) -> NrpfResult<f64> {
        if !self.is_closed() {
            return Ok(0.0);
        }
        let (ir, ii) = Switch::coupling(self.from, self.to, nodes)?.current(v);
        Ok(ir.hypot(ii))
    }

    /// Blow when the current exceeds the rating; a blown fuse stays open.
    pub fn try_adjust(&mut self, v: &[f64], nodes: &NodeMap) -> NrpfResult<bool> {
        let current = self.current_magnitude(v, nodes)?;
        if self.is_closed() && current > self.rating {
            warn!(fuse = %self.name, current, rating = self.rating, "fuse blown");
            self.state = SwitchState::Open;
            return Ok(true);
        }
        Ok(false)
    }
}

impl Stamp for Fuse {
    fn stamp_primal(
        &self,
        y: &mut MatrixBuilder,
        _j: &mut [f64],
        _v: &[f64],
        ctx: &StampContext<'_>,
    ) -> NrpfResult<()> {
        if self.is_closed() {
            Switch::coupling(self.from, self.to, ctx.nodes)?.stamp_primal(y);
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
            Switch::coupling(self.from, self.to, ctx.nodes)?.stamp_dual(y, j, v)?;
        }
        Ok(())
    }
}
