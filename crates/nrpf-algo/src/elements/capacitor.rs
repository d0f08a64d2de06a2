//! Switched shunt capacitor with voltage control.
//!
//! The capacitor is a susceptance `B = var / V_nom²` between `from` and
//! `to` (ground when `to` is `None`). An open capacitor is electrically
//! absent: no stamps, no residuals.

use serde::{Deserialize, Serialize};
use tracing::debug;

use nrpf_core::{BusId, NodeMap, NrpfError, NrpfResult};

use crate::sparse::MatrixBuilder;

use super::branch::Coupling;
use super::{Stamp, StampContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapacitorMode {
    Manual,
    Volt,
    Var,
    #[serde(rename = "VARVOLT")]
    VarVolt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwitchState {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Capacitor {
    pub name: String,
    pub from: BusId,
    pub to: Option<BusId>,
    pub mode: CapacitorMode,
    pub high_voltage: f64,
    pub low_voltage: f64,
    pub state: SwitchState,
    b: f64,
}

impl Capacitor {
    /// Closed capacitor rated `var` at `nominal_voltage`.
    pub fn new(
        name: impl Into<String>,
        from: BusId,
        to: Option<BusId>,
        var: f64,
        nominal_voltage: f64,
        mode: CapacitorMode,
    ) -> NrpfResult<Self> {
        let name = name.into();
        if nominal_voltage <= 0.0 || !nominal_voltage.is_finite() {
            return Err(NrpfError::Modeling(format!(
                "capacitor {}: nominal voltage must be positive, got {}",
                name, nominal_voltage
            )));
        }
        Ok(Self {
            name,
            from,
            to,
            mode,
            high_voltage: f64::INFINITY,
            low_voltage: 0.0,
            state: SwitchState::Closed,
            b: var / (nominal_voltage * nominal_voltage),
        })
    }

    /// Voltage band used by [`CapacitorMode::Volt`].
    pub fn with_voltage_band(mut self, low_voltage: f64, high_voltage: f64) -> Self {
        self.low_voltage = low_voltage;
        self.high_voltage = high_voltage;
        self
    }

    pub fn with_state(mut self, state: SwitchState) -> Self {
        self.state = state;
        self
    }

    pub fn susceptance(&self) -> f64 {
        self.b
    }

    pub fn is_closed(&self) -> bool {
        self.state == SwitchState::Closed
    }

    fn coupling(&self, nodes: &NodeMap) -> NrpfResult<Coupling> {
        Ok(Coupling::series(
            Some(nodes.bus(self.from)?),
            nodes.terminal(self.to)?,
            0.0,
            self.b,
        ))
    }

    /// Toggle on the measured `|V|` at `from`; `true` when the state changed.
    pub fn try_adjust(&mut self, v: &[f64], nodes: &NodeMap) -> NrpfResult<bool> {
        match self.mode {
            CapacitorMode::Manual => Ok(false),
            CapacitorMode::Volt => {
                let bus = nodes.bus(self.from)?;
                let magnitude = v[bus.r].hypot(v[bus.i]);
                let mut changed = false;
                if magnitude > self.high_voltage && self.state == SwitchState::Open {
                    self.state = SwitchState::Closed;
                    changed = true;
                }
                if magnitude < self.low_voltage && self.state == SwitchState::Closed {
                    self.state = SwitchState::Open;
                    changed = true;
                }
                if changed {
                    debug!(capacitor = %self.name, magnitude, state = ?self.state, "capacitor switched");
                }
                Ok(changed)
            }
            mode => Err(NrpfError::Modeling(format!(
                "capacitor {}: {:?} control is not supported",
                self.name, mode
            ))),
        }
    }
}

impl Stamp for Capacitor {
    fn stamp_primal(
        &self,
        y: &mut MatrixBuilder,
        _j: &mut [f64],
        _v: &[f64],
        ctx: &StampContext<'_>,
    ) -> NrpfResult<()> {
        if self.is_closed() {
            self.coupling(ctx.nodes)?.stamp_primal(y);
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
            self.coupling(ctx.nodes)?.stamp_dual(y, j, v)?;
        }
        Ok(())
    }
}
