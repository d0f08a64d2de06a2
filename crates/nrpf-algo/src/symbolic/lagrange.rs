//! Lagrangian handlers: compiled first-order conditions of a device.
//!
//! A device's contribution to the augmented Lagrangian is written once as
//! an [`Expr`] over three symbol groups: constants (device parameters),
//! primals (voltages, currents, reactive power) and duals (multipliers).
//! The handler differentiates it with respect to every primal and dual,
//! splits each derivative into Newton components, and compiles them.
//!
//! * Derivatives with respect to duals are the device's primal equations.
//! * Derivatives with respect to primals are its dual (stationarity)
//!   equations.
//!
//! Evaluation takes numeric values in the order constants, then primals,
//! then duals.

use nrpf_core::NrpfResult;

use super::compile::Tape;
use super::expr::{Expr, Symbol};
use super::split::split_expr;

/// One Newton component produced by a derivative entry.
///
/// `variable` and `secondary` are positions in the handler's variable list
/// (primals followed by duals). `secondary == None` is a right-hand-side
/// contribution; otherwise the value is the Y coefficient of `secondary` in
/// the equation of `variable`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Component {
    pub variable: usize,
    pub secondary: Option<usize>,
    pub value: f64,
}

/// ∂L/∂(variable), split and compiled.
#[derive(Debug, Clone)]
pub struct DerivativeEntry {
    pub variable: Symbol,
    pub derivative: Expr,
    constant_eval: Option<Tape>,
    variable_evals: Vec<(usize, Tape)>,
}

impl DerivativeEntry {
    fn new(
        variable: Symbol,
        derivative: Expr,
        variables: &[Symbol],
        inputs: &[Symbol],
    ) -> NrpfResult<Self> {
        let split = split_expr(&derivative, variables)?;

        let constant_eval = if split.constant.is_zero() {
            None
        } else {
            Some(Tape::compile(&split.constant, inputs)?)
        };

        let mut variable_evals = Vec::with_capacity(split.coefficients.len());
        for (var, coeff) in &split.coefficients {
            // split_expr only produces coefficients for entries of `variables`
            if let Some(pos) = variables.iter().position(|v| v == var) {
                variable_evals.push((pos, Tape::compile(coeff, inputs)?));
            }
        }

        Ok(Self {
            variable,
            derivative,
            constant_eval,
            variable_evals,
        })
    }

    /// Number of non-zero coefficient evaluators.
    pub fn nnz(&self) -> usize {
        self.variable_evals.len()
    }

    pub fn has_constant(&self) -> bool {
        self.constant_eval.is_some()
    }

    fn evaluate_into(
        &self,
        position: usize,
        inputs: &[f64],
        stack: &mut Vec<f64>,
        out: &mut Vec<Component>,
    ) {
        let constant = self
            .constant_eval
            .as_ref()
            .map_or(0.0, |tape| tape.eval_with(inputs, stack));
        out.push(Component {
            variable: position,
            secondary: None,
            value: constant,
        });
        for (secondary, tape) in &self.variable_evals {
            out.push(Component {
                variable: position,
                secondary: Some(*secondary),
                value: tape.eval_with(inputs, stack),
            });
        }
    }
}

#[derive(Debug, Clone)]
pub struct LagrangeHandler {
    pub lagrange: Expr,
    pub constants: Vec<Symbol>,
    pub primals: Vec<Symbol>,
    pub duals: Vec<Symbol>,
    derivatives: Vec<DerivativeEntry>,
}

impl LagrangeHandler {
    pub fn new(
        lagrange: Expr,
        constants: &[Symbol],
        primals: &[Symbol],
        duals: &[Symbol],
    ) -> NrpfResult<Self> {
        let variables: Vec<Symbol> = primals.iter().chain(duals).copied().collect();
        let inputs: Vec<Symbol> = constants.iter().chain(&variables).copied().collect();

        let derivatives = variables
            .iter()
            .map(|&var| DerivativeEntry::new(var, lagrange.diff(var), &variables, &inputs))
            .collect::<NrpfResult<Vec<_>>>()?;

        Ok(Self {
            lagrange,
            constants: constants.to_vec(),
            primals: primals.to_vec(),
            duals: duals.to_vec(),
            derivatives,
        })
    }

    pub fn variable_count(&self) -> usize {
        self.primals.len() + self.duals.len()
    }

    /// Derivative entry of the variable at `position` (primals, then duals).
    pub fn derivative(&self, position: usize) -> Option<&DerivativeEntry> {
        self.derivatives.get(position)
    }

    /// Primal equations: derivatives with respect to the duals.
    pub fn evaluate_primals(
        &self,
        constants: &[f64],
        primals: &[f64],
        duals: &[f64],
    ) -> Vec<Component> {
        let start = self.primals.len();
        self.evaluate_set(start..self.variable_count(), constants, primals, duals)
    }

    /// Dual equations: derivatives with respect to the primals.
    pub fn evaluate_duals(
        &self,
        constants: &[f64],
        primals: &[f64],
        duals: &[f64],
    ) -> Vec<Component> {
        self.evaluate_set(0..self.primals.len(), constants, primals, duals)
    }

    fn evaluate_set(
        &self,
        targets: std::ops::Range<usize>,
        constants: &[f64],
        primals: &[f64],
        duals: &[f64],
    ) -> Vec<Component> {
        let mut inputs = Vec::with_capacity(constants.len() + primals.len() + duals.len());
        inputs.extend_from_slice(constants);
        inputs.extend_from_slice(primals);
        inputs.extend_from_slice(duals);

        let mut stack = Vec::new();
        let mut out = Vec::new();
        for position in targets {
            if let Some(entry) = self.derivatives.get(position) {
                entry.evaluate_into(position, &inputs, &mut stack, &mut out);
            }
        }
        out
    }
}
