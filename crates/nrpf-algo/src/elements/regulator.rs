//! Step-voltage regulator.
//!
//! A real-ratio ideal core between the input bus and an internal node,
//! tied to the output bus by a stiff link.

use serde::{Deserialize, Serialize};

use nrpf_core::{BusId, NodeMap, NodePair, NrpfResult, UnknownKind};
use num_complex::Complex64;

use crate::sparse::MatrixBuilder;

use super::branch::Coupling;
use super::switch::CLOSED_CONDUCTANCE;
use super::transformer::IdealRatio;
use super::{Stamp, StampContext};

/// Per-tap ratio step of a standard 32-step regulator.
pub const DEFAULT_TAP_STEP: f64 = 0.00625;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegulatorType {
    /// `aR = 1 / (1 + step·tap)`
    A,
    /// `aR = 1 − step·tap`
    B,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Regulator {
    pub name: String,
    pub from: BusId,
    pub to: BusId,
    pub kind: RegulatorType,
    pub tap_position: i32,
    pub tap_step: f64,
    internal: NodePair,
    current: NodePair,
}

impl Regulator {
    pub fn new(
        name: impl Into<String>,
        from: BusId,
        to: BusId,
        kind: RegulatorType,
        tap_position: i32,
        nodes: &mut NodeMap,
    ) -> Self {
        Self {
            name: name.into(),
            from,
            to,
            kind,
            tap_position,
            tap_step: DEFAULT_TAP_STEP,
            internal: nodes.allocate_pair(UnknownKind::Voltage),
            current: nodes.allocate_pair(UnknownKind::Current),
        }
    }

    pub fn with_tap_step(mut self, step: f64) -> Self {
        self.tap_step = step;
        self
    }

    /// Effective voltage ratio `aR` of the current tap position.
    pub fn ratio(&self) -> f64 {
        let shift = self.tap_step * f64::from(self.tap_position);
        match self.kind {
            RegulatorType::A => 1.0 / (1.0 + shift),
            RegulatorType::B => 1.0 - shift,
        }
    }

    pub fn internal_node(&self) -> NodePair {
        self.internal
    }

    pub fn current_unknowns(&self) -> NodePair {
        self.current
    }

    fn parts(&self, nodes: &NodeMap) -> NrpfResult<(IdealRatio, Coupling)> {
        let core = IdealRatio {
            primary: nodes.bus(self.from)?,
            secondary: self.internal,
            current: self.current,
            ratio: Complex64::new(self.ratio(), 0.0),
        };
        let link = Coupling::series(
            Some(self.internal),
            Some(nodes.bus(self.to)?),
            CLOSED_CONDUCTANCE,
            0.0,
        );
        Ok((core, link))
    }
}

impl Stamp for Regulator {
    fn stamp_primal(
        &self,
        y: &mut MatrixBuilder,
        _j: &mut [f64],
        _v: &[f64],
        ctx: &StampContext<'_>,
    ) -> NrpfResult<()> {
        let (core, link) = self.parts(ctx.nodes)?;
        core.stamp_primal(y);
        link.stamp_primal(y);
        Ok(())
    }

    fn stamp_dual(
        &self,
        y: &mut MatrixBuilder,
        j: &mut [f64],
        v: &[f64],
        ctx: &StampContext<'_>,
    ) -> NrpfResult<()> {
        let (core, link) = self.parts(ctx.nodes)?;
        core.stamp_dual(y, j, v)?;
        link.stamp_dual(y, j, v)
    }
}
