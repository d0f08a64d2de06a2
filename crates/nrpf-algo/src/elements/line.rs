//! Transmission and distribution lines.
//!
//! A line of `n` conductors is described by its series impedance matrix
//! `Z` (n×n, self terms on the diagonal, mutual terms off it) and an
//! optional shunt susceptance matrix `B`. The series admittance is `Z⁻¹`;
//! half of `B` is placed at each end.

use faer::prelude::*;
use faer::solvers::PartialPivLu;
use faer::Mat;
use nrpf_core::{BusId, NrpfError, NrpfResult};
use num_complex::Complex64;

use crate::sparse::MatrixBuilder;

use super::branch::Coupling;
use super::{Stamp, StampContext};

/// Admittance magnitude past which an inverted impedance is treated as singular.
const SINGULAR_ADMITTANCE: f64 = 1e15;

#[derive(Debug, Clone, PartialEq)]
pub struct TransmissionLine {
    pub name: String,
    pub from: Vec<BusId>,
    pub to: Vec<BusId>,
    admittance: Vec<Vec<Complex64>>,
    shunt_b: Vec<Vec<f64>>,
}

impl TransmissionLine {
    pub fn new(
        name: impl Into<String>,
        from: Vec<BusId>,
        to: Vec<BusId>,
        impedance: Vec<Vec<Complex64>>,
        shunt_b: Option<Vec<Vec<f64>>>,
    ) -> NrpfResult<Self> {
        let name = name.into();
        let n = from.len();
        if n == 0 || to.len() != n {
            return Err(NrpfError::Modeling(format!(
                "line {}: {} from phases and {} to phases",
                name,
                n,
                to.len()
            )));
        }
        if impedance.len() != n || impedance.iter().any(|row| row.len() != n) {
            return Err(NrpfError::Modeling(format!(
                "line {}: impedance matrix must be {}x{}",
                name, n, n
            )));
        }
        let shunt_b = shunt_b.unwrap_or_else(|| vec![vec![0.0; n]; n]);
        if shunt_b.len() != n || shunt_b.iter().any(|row| row.len() != n) {
            return Err(NrpfError::Modeling(format!(
                "line {}: shunt susceptance matrix must be {}x{}",
                name, n, n
            )));
        }
        let admittance = invert(&impedance).ok_or_else(|| {
            NrpfError::Modeling(format!("line {}: impedance matrix is singular", name))
        })?;

        Ok(Self {
            name,
            from,
            to,
            admittance,
            shunt_b,
        })
    }

    /// Positive-sequence line from per-unit `r`, `x` and total charging `b`.
    pub fn single_phase(
        name: impl Into<String>,
        from: BusId,
        to: BusId,
        r: f64,
        x: f64,
        b: f64,
    ) -> NrpfResult<Self> {
        Self::new(
            name,
            vec![from],
            vec![to],
            vec![vec![Complex64::new(r, x)]],
            Some(vec![vec![b]]),
        )
    }

    pub fn phases(&self) -> usize {
        self.from.len()
    }

    /// Series admittance matrix `Z⁻¹`.
    pub fn admittance(&self) -> &[Vec<Complex64>] {
        &self.admittance
    }

    fn couplings(&self, ctx: &StampContext<'_>) -> NrpfResult<Vec<Coupling>> {
        let n = self.phases();
        let from = self
            .from
            .iter()
            .map(|&bus| ctx.nodes.bus(bus))
            .collect::<NrpfResult<Vec<_>>>()?;
        let to = self
            .to
            .iter()
            .map(|&bus| ctx.nodes.bus(bus))
            .collect::<NrpfResult<Vec<_>>>()?;

        let mut out = Vec::with_capacity(3 * n * n);
        for i in 0..n {
            for k in 0..n {
                let y = self.admittance[i][k];
                if y.norm_sqr() > 0.0 {
                    out.push(Coupling {
                        a: Some(from[i]),
                        b: Some(to[i]),
                        c: Some(from[k]),
                        d: Some(to[k]),
                        g: y.re,
                        b_susceptance: y.im,
                    });
                }
                let half_b = self.shunt_b[i][k] / 2.0;
                if half_b != 0.0 {
                    for end in [&from, &to] {
                        out.push(Coupling {
                            a: Some(end[i]),
                            b: None,
                            c: Some(end[k]),
                            d: None,
                            g: 0.0,
                            b_susceptance: half_b,
                        });
                    }
                }
            }
        }
        Ok(out)
    }
}

impl Stamp for TransmissionLine {
    fn stamp_primal(
        &self,
        y: &mut MatrixBuilder,
        _j: &mut [f64],
        _v: &[f64],
        ctx: &StampContext<'_>,
    ) -> NrpfResult<()> {
        for coupling in self.couplings(ctx)? {
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
        for coupling in self.couplings(ctx)? {
            coupling.stamp_dual(y, j, v)?;
        }
        Ok(())
    }
}

/// Inverts `Z = R + jX` through its real block form `[[R, -X], [X, R]]`,
/// solving for the first `n` columns of the inverse with a dense LU.
/// `None` when the result is non-finite or past `SINGULAR_ADMITTANCE`.
fn invert(matrix: &[Vec<Complex64>]) -> Option<Vec<Vec<Complex64>>> {
    let n = matrix.len();
    let mut block = Mat::<f64>::zeros(2 * n, 2 * n);
    for (i, row) in matrix.iter().enumerate() {
        for (k, z) in row.iter().enumerate() {
            block.write(i, k, z.re);
            block.write(i, n + k, -z.im);
            block.write(n + i, k, z.im);
            block.write(n + i, n + k, z.re);
        }
    }
    let identity = Mat::from_fn(2 * n, n, |i, k| if i == k { 1.0 } else { 0.0 });

    let lu = PartialPivLu::new(block.as_ref());
    let sol = lu.solve(&identity);

    let inv: Vec<Vec<Complex64>> = (0..n)
        .map(|i| {
            (0..n)
                .map(|k| Complex64::new(sol.read(i, k), sol.read(n + i, k)))
                .collect()
        })
        .collect();
    let singular = inv
        .iter()
        .flatten()
        .any(|y| !y.re.is_finite() || !y.im.is_finite() || y.norm() > SINGULAR_ADMITTANCE);
    (!singular).then_some(inv)
}
