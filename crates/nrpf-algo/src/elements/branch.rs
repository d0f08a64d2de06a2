//! Coupled admittance, the building block of every series/shunt device.
//!
//! The current leaving node `a` and entering node `b` is `(G + jB)(V_c − V_d)`.
//! With `a = c` and `b = d` this is an ordinary two-terminal admittance;
//! distinct pairs give the mutual terms of multi-phase lines.

use nrpf_core::{NodePair, NrpfResult};

use crate::sparse::MatrixBuilder;

use super::binding::{stamp_dual_equations, Binding};
use super::handlers;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coupling {
    pub a: Option<NodePair>,
    pub b: Option<NodePair>,
    pub c: Option<NodePair>,
    pub d: Option<NodePair>,
    pub g: f64,
    pub b_susceptance: f64,
}

impl Coupling {
    /// Two-terminal admittance between `from` and `to`.
    pub fn series(from: Option<NodePair>, to: Option<NodePair>, g: f64, b: f64) -> Self {
        Self {
            a: from,
            b: to,
            c: from,
            d: to,
            g,
            b_susceptance: b,
        }
    }

    /// Admittance from `node` to ground.
    pub fn shunt(node: Option<NodePair>, g: f64, b: f64) -> Self {
        Self::series(node, None, g, b)
    }

    pub fn stamp_primal(&self, y: &mut MatrixBuilder) {
        let (g, b) = (self.g, self.b_susceptance);
        for (row, row_sign) in [(self.a, 1.0), (self.b, -1.0)] {
            let Some(row) = row else { continue };
            for (col, col_sign) in [(self.c, 1.0), (self.d, -1.0)] {
                let Some(col) = col else { continue };
                let sign = row_sign * col_sign;
                y.add(row.r, col.r, sign * g);
                y.add(row.r, col.i, -sign * b);
                y.add(row.i, col.r, sign * b);
                y.add(row.i, col.i, sign * g);
            }
        }
    }

    pub fn stamp_dual(&self, y: &mut MatrixBuilder, j: &mut [f64], v: &[f64]) -> NrpfResult<()> {
        let binding = Binding::new()
            .pair(self.a)
            .pair(self.b)
            .pair(self.c)
            .pair(self.d);
        stamp_dual_equations(
            handlers::branch()?,
            &[self.g, self.b_susceptance],
            &binding,
            y,
            j,
            v,
        );
        Ok(())
    }

    /// Complex current leaving `a`, as `(real, imag)`.
    pub fn current(&self, v: &[f64]) -> (f64, f64) {
        let part = |node: Option<NodePair>| node.map_or((0.0, 0.0), |n| (v[n.r], v[n.i]));
        let (cr, ci) = part(self.c);
        let (dr, di) = part(self.d);
        let (vr, vi) = (cr - dr, ci - di);
        (
            self.g * vr - self.b_susceptance * vi,
            self.g * vi + self.b_susceptance * vr,
        )
    }
}
