//! Two-winding transformer with off-nominal complex ratio.
//!
//! Modeled as an ideal ratio `V_p = a·V_x` between the primary bus and an
//! internal node `x`, followed by the series impedance from `x` to the
//! secondary bus. The ideal core carries an explicit primary current
//! unknown; the secondary winding current is `−conj(a)·I_p`.

use nrpf_core::{BusId, NodeMap, NodePair, NrpfError, NrpfResult, UnknownKind};
use num_complex::Complex64;

use crate::sparse::MatrixBuilder;

use super::binding::{stamp_dual_equations, Binding};
use super::branch::Coupling;
use super::switch::CLOSED_CONDUCTANCE;
use super::{handlers, Stamp, StampContext};

/// Ideal ratio constraint shared by transformers and regulators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct IdealRatio {
    pub primary: NodePair,
    pub secondary: NodePair,
    pub current: NodePair,
    pub ratio: Complex64,
}

impl IdealRatio {
    pub fn stamp_primal(&self, y: &mut MatrixBuilder) {
        let (p, s, i) = (self.primary, self.secondary, self.current);
        let (ar, ai) = (self.ratio.re, self.ratio.im);

        // V_p − a·V_s = 0
        y.add(i.r, p.r, 1.0);
        y.add(i.r, s.r, -ar);
        y.add(i.r, s.i, ai);
        y.add(i.i, p.i, 1.0);
        y.add(i.i, s.i, -ar);
        y.add(i.i, s.r, -ai);

        // primary KCL
        y.add(p.r, i.r, 1.0);
        y.add(p.i, i.i, 1.0);

        // secondary KCL: −conj(a)·I_p
        y.add(s.r, i.r, -ar);
        y.add(s.r, i.i, -ai);
        y.add(s.i, i.i, -ar);
        y.add(s.i, i.r, ai);
    }

    pub fn stamp_dual(&self, y: &mut MatrixBuilder, j: &mut [f64], v: &[f64]) -> NrpfResult<()> {
        let binding = Binding::new()
            .pair(Some(self.primary))
            .pair(Some(self.secondary))
            .pair(Some(self.current));
        stamp_dual_equations(
            handlers::ideal_transformer()?,
            &[self.ratio.re, self.ratio.im],
            &binding,
            y,
            j,
            v,
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transformer {
    pub name: String,
    pub from: BusId,
    pub to: BusId,
    /// Off-nominal turns ratio magnitude
    pub tap: f64,
    /// Phase shift in radians
    pub shift: f64,
    pub r: f64,
    pub x: f64,
    /// Magnetizing conductance at the primary
    pub g_mag: f64,
    /// Magnetizing susceptance at the primary
    pub b_mag: f64,
    internal: NodePair,
    current: NodePair,
}

impl Transformer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        from: BusId,
        to: BusId,
        tap: f64,
        shift: f64,
        r: f64,
        x: f64,
        nodes: &mut NodeMap,
    ) -> NrpfResult<Self> {
        let name = name.into();
        if !(tap.is_finite() && tap > 0.0) {
            return Err(NrpfError::Modeling(format!(
                "transformer {}: tap ratio must be positive, got {}",
                name, tap
            )));
        }
        Ok(Self {
            name,
            from,
            to,
            tap,
            shift,
            r,
            x,
            g_mag: 0.0,
            b_mag: 0.0,
            internal: nodes.allocate_pair(UnknownKind::Voltage),
            current: nodes.allocate_pair(UnknownKind::Current),
        })
    }

    pub fn with_magnetizing(mut self, g: f64, b: f64) -> Self {
        self.g_mag = g;
        self.b_mag = b;
        self
    }

    /// Voltage unknowns of the node between the ideal core and the impedance.
    pub fn internal_node(&self) -> NodePair {
        self.internal
    }

    pub fn current_unknowns(&self) -> NodePair {
        self.current
    }

    pub fn ratio(&self) -> Complex64 {
        Complex64::from_polar(self.tap, self.shift)
    }

    fn core(&self, nodes: &NodeMap) -> NrpfResult<IdealRatio> {
        Ok(IdealRatio {
            primary: nodes.bus(self.from)?,
            secondary: self.internal,
            current: self.current,
            ratio: self.ratio(),
        })
    }

    fn couplings(&self, nodes: &NodeMap) -> NrpfResult<Vec<Coupling>> {
        let z = Complex64::new(self.r, self.x);
        let series = if z.norm_sqr() > 0.0 {
            z.inv()
        } else {
            Complex64::new(CLOSED_CONDUCTANCE, 0.0)
        };
        let mut out = vec![Coupling::series(
            Some(self.internal),
            Some(nodes.bus(self.to)?),
            series.re,
            series.im,
        )];
        if self.g_mag != 0.0 || self.b_mag != 0.0 {
            out.push(Coupling::shunt(
                Some(nodes.bus(self.from)?),
                self.g_mag,
                self.b_mag,
            ));
        }
        Ok(out)
    }
}

impl Stamp for Transformer {
    fn stamp_primal(
        &self,
        y: &mut MatrixBuilder,
        _j: &mut [f64],
        _v: &[f64],
        ctx: &StampContext<'_>,
    ) -> NrpfResult<()> {
        self.core(ctx.nodes)?.stamp_primal(y);
        for coupling in self.couplings(ctx.nodes)? {
            coupling.stamp_primal(y);
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
        self.core(ctx.nodes)?.stamp_dual(y, j, v)?;
        for coupling in self.couplings(ctx.nodes)? {
            coupling.stamp_dual(y, j, v)?;
        }
        Ok(())
    }
}
