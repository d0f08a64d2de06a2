//! Splitting a derivative into its Newton stamp components.
//!
//! Given an equation `f(x) = 0` (a derivative of a Lagrangian), Newton
//! linearization around a point `x0` gives
//!
//! ```text
//! Σ_v ∂f/∂v(x0) · v  =  Σ_v ∂f/∂v(x0) · v0 − f(x0)
//!   └── Y row ──┘        └────────── J entry ─────────┘
//! ```
//!
//! [`split_expr`] produces both sides symbolically. Each additive term of
//! the expanded equation is classified, in this order:
//!
//! 1. constant (no unknowns): moves to the right-hand side, negated
//! 2. exactly linear in one unknown: contributes its coefficient to Y
//! 3. anything else: linearized, contributing to both Y and J
//!
//! so that for every point, `Σ coefficient·v − constant` reproduces `f`.

use std::collections::BTreeMap;

use nrpf_core::{NrpfError, NrpfResult};

use super::expr::{Expr, Symbol};

/// Symbolic Newton components of one equation.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    /// Right-hand side (J) expression
    pub constant: Expr,
    /// Coefficient (Y) expression for each unknown; zeros omitted
    pub coefficients: BTreeMap<Symbol, Expr>,
}

/// True if `expr` depends on none of `vars`.
pub fn is_constant(expr: &Expr, vars: &[Symbol]) -> bool {
    !expr.free_symbols().iter().any(|s| vars.contains(s))
}

/// True if `expr` depends on `vars` and every second derivative vanishes.
pub fn is_linear(expr: &Expr, vars: &[Symbol]) -> bool {
    if is_constant(expr, vars) {
        return false;
    }
    let present: Vec<Symbol> = expr
        .free_symbols()
        .into_iter()
        .filter(|s| vars.contains(s))
        .collect();
    for &x in &present {
        let first = expr.diff(x);
        for &y in &present {
            if !first.diff(y).is_zero() {
                return false;
            }
        }
    }
    true
}

/// The single unknown a linear term depends on.
///
/// Asking for the linear term of anything else is a modeling bug and is
/// reported as such.
pub fn linear_term(expr: &Expr, vars: &[Symbol]) -> NrpfResult<Symbol> {
    if !is_linear(expr, vars) {
        return Err(NrpfError::Modeling(format!(
            "expression is not linear: {}",
            expr
        )));
    }
    let mut present = expr.free_symbols().into_iter().filter(|s| vars.contains(s));
    match (present.next(), present.next()) {
        (Some(var), None) => Ok(var),
        _ => Err(NrpfError::Modeling(format!(
            "expression is not linear in exactly one variable: {}",
            expr
        ))),
    }
}

/// First-order expansion of a nonlinear term around the symbols themselves.
///
/// Returns `(−t + Σ ∂t/∂v · v, {v: ∂t/∂v})`.
fn linearize_term(term: &Expr, vars: &[Symbol]) -> (Expr, Vec<(Symbol, Expr)>) {
    let mut constant = vec![-term.clone()];
    let mut coefficients = Vec::new();
    for &var in vars {
        let derivative = term.diff(var);
        if derivative.is_zero() {
            continue;
        }
        constant.push(derivative.clone() * Expr::Sym(var));
        coefficients.push((var, derivative));
    }
    (Expr::Add(constant), coefficients)
}

/// Split `eqn` into its right-hand-side and per-unknown coefficient parts.
pub fn split_expr(eqn: &Expr, vars: &[Symbol]) -> NrpfResult<Split> {
    let mut constant: Vec<Expr> = Vec::new();
    let mut coefficients: BTreeMap<Symbol, Vec<Expr>> = BTreeMap::new();

    for term in eqn.expand() {
        if is_constant(&term, vars) {
            constant.push(-term);
        } else if is_linear(&term, vars) {
            let var = linear_term(&term, vars)?;
            coefficients.entry(var).or_default().push(term.diff(var));
        } else {
            let (rhs, coeffs) = linearize_term(&term, vars);
            constant.push(rhs);
            for (var, coeff) in coeffs {
                coefficients.entry(var).or_default().push(coeff);
            }
        }
    }

    let coefficients = coefficients
        .into_iter()
        .map(|(var, parts)| (var, Expr::Add(parts).simplify()))
        .filter(|(_, coeff)| !coeff.is_zero())
        .collect();

    Ok(Split {
        constant: Expr::Add(constant).simplify(),
        coefficients,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const X: Symbol = Symbol("x");
    const Y: Symbol = Symbol("y");
    const K: Symbol = Symbol("k");

    fn reconstruct(split: &Split, env: &HashMap<Symbol, f64>) -> f64 {
        let linear: f64 = split
            .coefficients
            .iter()
            .map(|(var, coeff)| coeff.eval(env).unwrap() * env[var])
            .sum();
        linear - split.constant.eval(env).unwrap()
    }

    #[test]
    fn quadratic_round_trip() {
        // f = 3x^2 + k*x*y - 2y + 5
        let x = Expr::Sym(X);
        let y = Expr::Sym(Y);
        let k = Expr::Sym(K);
        let f = 3.0 * x.clone().powi(2) + k * x * y.clone() - 2.0 * y + 5.0;
        let split = split_expr(&f, &[X, Y]).unwrap();

        for &(xv, yv, kv) in &[(0.3, -1.2, 2.0), (1.7, 0.4, -0.5), (0.0, 0.0, 1.0)] {
            let env: HashMap<Symbol, f64> = [(X, xv), (Y, yv), (K, kv)].into_iter().collect();
            let direct = f.eval(&env).unwrap();
            let rebuilt = reconstruct(&split, &env);
            assert!(
                (direct - rebuilt).abs() < 1e-12,
                "split does not reproduce f at ({}, {}): {} vs {}",
                xv,
                yv,
                direct,
                rebuilt
            );
        }
    }

    #[test]
    fn linear_terms_have_no_rhs() {
        let x = Expr::Sym(X);
        let f = 4.0 * x - Expr::Sym(K);
        let split = split_expr(&f, &[X, Y]).unwrap();
        assert_eq!(split.coefficients.len(), 1);
        assert_eq!(split.coefficients[&X], Expr::Const(4.0));
        // −(−k) = k on the right-hand side
        assert_eq!(split.constant, Expr::Sym(K));
    }

    #[test]
    fn zero_coefficients_are_dropped() {
        let x = Expr::Sym(X);
        let f = x.clone() - x + Expr::Sym(Y);
        let split = split_expr(&f, &[X, Y]).unwrap();
        assert!(!split.coefficients.contains_key(&X));
        assert!(split.constant.is_zero());
    }

    #[test]
    fn linear_term_rejects_nonlinear_expressions() {
        let x = Expr::Sym(X);
        let y = Expr::Sym(Y);
        let err = linear_term(&(x.clone() * y), &[X, Y]).unwrap_err();
        assert!(matches!(err, NrpfError::Modeling(_)));
        assert!(linear_term(&Expr::Sym(K), &[X, Y]).is_err());
        assert_eq!(linear_term(&(2.0 * x), &[X, Y]).unwrap(), X);
    }

    #[test]
    fn classification_order() {
        let x = Expr::Sym(X);
        assert!(is_constant(&Expr::Sym(K), &[X]));
        assert!(!is_linear(&Expr::Sym(K), &[X]));
        assert!(is_linear(&(Expr::Sym(K) * x.clone()), &[X]));
        assert!(!is_linear(&x.powi(2), &[X]));
    }
}
