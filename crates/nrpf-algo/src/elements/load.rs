//! Loads: constant power (nonlinear) and constant impedance (linear).

use nrpf_core::{BusId, NodePair, NrpfError, NrpfResult};

use crate::sparse::MatrixBuilder;

use super::binding::{stamp_dual_equations, Binding};
use super::branch::Coupling;
use super::{add_j, add_y, handlers, Stamp, StampContext};

/// Current drawn by a constant `P + jQ` at voltage `vr + j·vi`, with its
/// partial derivatives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PqLinearization {
    pub fr: f64,
    pub fi: f64,
    pub dfr_dvr: f64,
    pub dfr_dvi: f64,
    pub dfi_dvr: f64,
    pub dfi_dvi: f64,
}

impl PqLinearization {
    pub fn at(p: f64, q: f64, vr: f64, vi: f64) -> Self {
        let d = vr * vr + vi * vi;
        let d2 = d * d;
        let a = p * vr + q * vi;
        let b = p * vi - q * vr;
        Self {
            fr: a / d,
            fi: b / d,
            dfr_dvr: (p * d - 2.0 * vr * a) / d2,
            dfr_dvi: (q * d - 2.0 * vi * a) / d2,
            dfi_dvr: (-q * d - 2.0 * vr * b) / d2,
            dfi_dvi: (p * d - 2.0 * vi * b) / d2,
        }
    }
}

fn pair_values(pair: Option<NodePair>, v: &[f64]) -> (f64, f64) {
    pair.map_or((0.0, 0.0), |n| (v[n.r], v[n.i]))
}

/// Constant-power load between `from` and `to` (ground when `None`).
#[derive(Debug, Clone, PartialEq)]
pub struct PqLoad {
    pub name: String,
    pub from: BusId,
    pub to: Option<BusId>,
    pub p: f64,
    pub q: f64,
}

impl PqLoad {
    pub fn new(name: impl Into<String>, from: BusId, to: Option<BusId>, p: f64, q: f64) -> Self {
        Self {
            name: name.into(),
            from,
            to,
            p,
            q,
        }
    }

    fn binding(&self, ctx: &StampContext<'_>) -> NrpfResult<(Option<NodePair>, Option<NodePair>)> {
        Ok((Some(ctx.nodes.bus(self.from)?), ctx.nodes.terminal(self.to)?))
    }
}

impl Stamp for PqLoad {
    fn stamp_primal(
        &self,
        y: &mut MatrixBuilder,
        j: &mut [f64],
        v_previous: &[f64],
        ctx: &StampContext<'_>,
    ) -> NrpfResult<()> {
        let (a, b) = self.binding(ctx)?;
        let (ar, ai) = pair_values(a, v_previous);
        let (br, bi) = pair_values(b, v_previous);
        let (vr, vi) = (ar - br, ai - bi);
        let lin = PqLinearization::at(self.p * ctx.tx_factor, self.q * ctx.tx_factor, vr, vi);

        let j_r = lin.dfr_dvr * vr + lin.dfr_dvi * vi - lin.fr;
        let j_i = lin.dfi_dvr * vr + lin.dfi_dvi * vi - lin.fi;

        for (node, sign) in [(a, 1.0), (b, -1.0)] {
            let Some(row) = node else { continue };
            for (col, col_sign) in [(a, 1.0), (b, -1.0)] {
                let s = sign * col_sign;
                let (cr, ci) = (col.map(|c| c.r), col.map(|c| c.i));
                add_y(y, Some(row.r), cr, s * lin.dfr_dvr);
                add_y(y, Some(row.r), ci, s * lin.dfr_dvi);
                add_y(y, Some(row.i), cr, s * lin.dfi_dvr);
                add_y(y, Some(row.i), ci, s * lin.dfi_dvi);
            }
            add_j(j, Some(row.r), sign * j_r);
            add_j(j, Some(row.i), sign * j_i);
        }
        Ok(())
    }

    fn stamp_dual(
        &self,
        y: &mut MatrixBuilder,
        j: &mut [f64],
        v_previous: &[f64],
        ctx: &StampContext<'_>,
    ) -> NrpfResult<()> {
        let (a, b) = self.binding(ctx)?;
        let binding = Binding::new().pair(a).pair(b);
        stamp_dual_equations(
            handlers::pq_load()?,
            &[self.p * ctx.tx_factor, self.q * ctx.tx_factor],
            &binding,
            y,
            j,
            v_previous,
        );
        Ok(())
    }
}

/// Constant-impedance load between `from` and `to` (ground when `None`).
#[derive(Debug, Clone, PartialEq)]
pub struct ImpedanceLoad {
    pub name: String,
    pub from: BusId,
    pub to: Option<BusId>,
    pub g: f64,
    pub b: f64,
}

impl ImpedanceLoad {
    pub fn new(name: impl Into<String>, from: BusId, to: Option<BusId>, g: f64, b: f64) -> Self {
        Self {
            name: name.into(),
            from,
            to,
            g,
            b,
        }
    }

    /// Admittance drawing `P + jQ` at `nominal_voltage`.
    pub fn from_power(
        name: impl Into<String>,
        from: BusId,
        to: Option<BusId>,
        p: f64,
        q: f64,
        nominal_voltage: f64,
    ) -> NrpfResult<Self> {
        let name = name.into();
        if !(nominal_voltage.is_finite() && nominal_voltage > 0.0) {
            return Err(NrpfError::Modeling(format!(
                "load {}: nominal voltage must be positive, got {}",
                name, nominal_voltage
            )));
        }
        let v2 = nominal_voltage * nominal_voltage;
        Ok(Self::new(name, from, to, p / v2, -q / v2))
    }

    /// Pure resistance `r`.
    pub fn resistive(name: impl Into<String>, from: BusId, to: Option<BusId>, r: f64) -> NrpfResult<Self> {
        let name = name.into();
        if !(r.is_finite() && r > 0.0) {
            return Err(NrpfError::Modeling(format!(
                "load {}: resistance must be positive, got {}",
                name, r
            )));
        }
        Ok(Self::new(name, from, to, 1.0 / r, 0.0))
    }

    fn coupling(&self, ctx: &StampContext<'_>) -> NrpfResult<Coupling> {
        Ok(Coupling::series(
            Some(ctx.nodes.bus(self.from)?),
            ctx.nodes.terminal(self.to)?,
            self.g,
            self.b,
        ))
    }
}

impl Stamp for ImpedanceLoad {
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
