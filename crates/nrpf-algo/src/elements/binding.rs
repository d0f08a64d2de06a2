//! Binding of Lagrangian symbols to positions in the unknown vector.
//!
//! A [`LagrangeHandler`] works on abstract symbols. To stamp it, each
//! symbol is bound to a [`Slot`]: the column its value is read from and
//! the row its first-order condition is written to. For a primal/dual pair
//! `(x, λ)` the equation `∂L/∂λ` lives in row `x` and `∂L/∂x` lives in row
//! `λ`. Ground terminals bind to an empty slot: value zero, no stamps.

use nrpf_core::{AuxUnknown, NodePair};

use crate::sparse::MatrixBuilder;
use crate::symbolic::{Component, LagrangeHandler};

use super::Residuals;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Slot {
    /// Column the symbol's value is read from
    pub index: Option<usize>,
    /// Row that receives the derivative with respect to this symbol
    pub row: Option<usize>,
}

impl Slot {
    #[inline]
    pub fn value(&self, v: &[f64]) -> f64 {
        self.index.map_or(0.0, |i| v[i])
    }
}

/// Slots for a handler's primals and duals, in handler order.
#[derive(Debug, Clone, Default)]
pub struct Binding {
    primals: Vec<Slot>,
    duals: Vec<Slot>,
}

impl Binding {
    pub fn new() -> Self {
        Self::default()
    }

    /// A real/imaginary pair with its paired duals; `None` is ground.
    pub fn pair(mut self, pair: Option<NodePair>) -> Self {
        match pair {
            Some(p) => {
                self.primals.push(Slot {
                    index: Some(p.r),
                    row: p.lr,
                });
                self.primals.push(Slot {
                    index: Some(p.i),
                    row: p.li,
                });
                self.duals.push(Slot {
                    index: p.lr,
                    row: Some(p.r),
                });
                self.duals.push(Slot {
                    index: p.li,
                    row: Some(p.i),
                });
            }
            None => {
                self.primals.extend([Slot::default(); 2]);
                self.duals.extend([Slot::default(); 2]);
            }
        }
        self
    }

    /// A scalar unknown with its paired dual.
    pub fn aux(mut self, aux: AuxUnknown) -> Self {
        self.primals.push(Slot {
            index: Some(aux.index),
            row: aux.dual,
        });
        self.duals.push(Slot {
            index: aux.dual,
            row: Some(aux.index),
        });
        self
    }

    /// Primals whose stationarity equations live in their own rows.
    pub fn self_paired(mut self, pair: NodePair) -> Self {
        self.primals.push(Slot {
            index: Some(pair.r),
            row: Some(pair.r),
        });
        self.primals.push(Slot {
            index: Some(pair.i),
            row: Some(pair.i),
        });
        self
    }

    /// Multipliers of equations owned by another unknown (e.g. bus KCL).
    pub fn multipliers_of(mut self, pair: NodePair) -> Self {
        self.duals.push(Slot {
            index: pair.lr,
            row: Some(pair.r),
        });
        self.duals.push(Slot {
            index: pair.li,
            row: Some(pair.i),
        });
        self
    }

    fn slot(&self, position: usize) -> Slot {
        if position < self.primals.len() {
            self.primals[position]
        } else {
            self.duals
                .get(position - self.primals.len())
                .copied()
                .unwrap_or_default()
        }
    }

    pub fn primal_values(&self, v: &[f64]) -> Vec<f64> {
        self.primals.iter().map(|s| s.value(v)).collect()
    }

    pub fn dual_values(&self, v: &[f64]) -> Vec<f64> {
        self.duals.iter().map(|s| s.value(v)).collect()
    }

    /// Route evaluated components into Y and J.
    pub fn stamp(&self, y: &mut MatrixBuilder, j: &mut [f64], components: &[Component]) {
        for comp in components {
            let Some(row) = self.slot(comp.variable).row else {
                continue;
            };
            match comp.secondary {
                None => j[row] += comp.value,
                Some(secondary) => {
                    if let Some(col) = self.slot(secondary).index {
                        y.add(row, col, comp.value);
                    }
                }
            }
        }
    }

    /// Equation values `Σ coeff·x − rhs` per row.
    pub fn residuals(&self, v: &[f64], components: &[Component], out: &mut Residuals) {
        for comp in components {
            let Some(row) = self.slot(comp.variable).row else {
                continue;
            };
            let contribution = match comp.secondary {
                None => -comp.value,
                Some(secondary) => comp.value * self.slot(secondary).value(v),
            };
            *out.entry(row).or_insert(0.0) += contribution;
        }
    }
}

/// Evaluate a handler's dual equations at `v` and stamp them.
pub fn stamp_dual_equations(
    handler: &LagrangeHandler,
    constants: &[f64],
    binding: &Binding,
    y: &mut MatrixBuilder,
    j: &mut [f64],
    v: &[f64],
) {
    let components = handler.evaluate_duals(
        constants,
        &binding.primal_values(v),
        &binding.dual_values(v),
    );
    binding.stamp(y, j, &components);
}

/// Evaluate a handler's primal equations at `v` and stamp them.
pub fn stamp_primal_equations(
    handler: &LagrangeHandler,
    constants: &[f64],
    binding: &Binding,
    y: &mut MatrixBuilder,
    j: &mut [f64],
    v: &[f64],
) {
    let components = handler.evaluate_primals(
        constants,
        &binding.primal_values(v),
        &binding.dual_values(v),
    );
    binding.stamp(y, j, &components);
}
