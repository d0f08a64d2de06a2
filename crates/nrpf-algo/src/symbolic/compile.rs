//! Compilation of expressions into flat stack programs.
//!
//! An expression is compiled once against a fixed input layout (the order
//! of symbols in the evaluation vector). Evaluation then walks a `Vec<Op>`
//! with a small value stack and never touches the tree again.

use nrpf_core::{NrpfError, NrpfResult};

use super::expr::{Expr, Symbol};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    Const(f64),
    /// Push `inputs[slot]`
    Load(usize),
    /// Pop `n` values, push their sum
    Add(usize),
    /// Pop `n` values, push their product
    Mul(usize),
    Powi(i32),
}

/// Compiled evaluator for one expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Tape {
    ops: Vec<Op>,
    max_depth: usize,
    inputs: usize,
}

impl Tape {
    /// Compile `expr` for inputs laid out as `layout`.
    pub fn compile(expr: &Expr, layout: &[Symbol]) -> NrpfResult<Self> {
        let mut ops = Vec::new();
        emit(expr, layout, &mut ops)?;

        let mut depth = 0usize;
        let mut max_depth = 0usize;
        for op in &ops {
            match op {
                Op::Const(_) | Op::Load(_) => depth += 1,
                Op::Add(n) | Op::Mul(n) => depth = depth + 1 - n,
                Op::Powi(_) => {}
            }
            max_depth = max_depth.max(depth);
        }

        Ok(Self {
            ops,
            max_depth,
            inputs: layout.len(),
        })
    }

    /// Number of inputs the tape was compiled for.
    pub fn arity(&self) -> usize {
        self.inputs
    }

    pub fn eval(&self, inputs: &[f64]) -> f64 {
        let mut stack = Vec::with_capacity(self.max_depth);
        self.eval_with(inputs, &mut stack)
    }

    /// Evaluate reusing a caller-provided stack buffer.
    pub fn eval_with(&self, inputs: &[f64], stack: &mut Vec<f64>) -> f64 {
        stack.clear();
        for op in &self.ops {
            match *op {
                Op::Const(c) => stack.push(c),
                Op::Load(slot) => stack.push(inputs[slot]),
                Op::Add(n) => {
                    let start = stack.len() - n;
                    let value: f64 = stack.drain(start..).sum();
                    stack.push(value);
                }
                Op::Mul(n) => {
                    let start = stack.len() - n;
                    let value: f64 = stack.drain(start..).product();
                    stack.push(value);
                }
                Op::Powi(n) => {
                    if let Some(top) = stack.last_mut() {
                        *top = top.powi(n);
                    }
                }
            }
        }
        stack.pop().unwrap_or(0.0)
    }
}

fn emit(expr: &Expr, layout: &[Symbol], ops: &mut Vec<Op>) -> NrpfResult<()> {
    match expr {
        Expr::Const(c) => ops.push(Op::Const(*c)),
        Expr::Sym(s) => {
            let slot = layout.iter().position(|l| l == s).ok_or_else(|| {
                NrpfError::Modeling(format!("symbol {} is not part of the input layout", s))
            })?;
            ops.push(Op::Load(slot));
        }
        Expr::Add(items) | Expr::Mul(items) if items.is_empty() => {
            let identity = if matches!(expr, Expr::Add(_)) { 0.0 } else { 1.0 };
            ops.push(Op::Const(identity));
        }
        Expr::Add(items) => {
            for item in items {
                emit(item, layout, ops)?;
            }
            ops.push(Op::Add(items.len()));
        }
        Expr::Mul(items) => {
            for item in items {
                emit(item, layout, ops)?;
            }
            ops.push(Op::Mul(items.len()));
        }
        Expr::Pow(base, n) => {
            emit(base, layout, ops)?;
            ops.push(Op::Powi(*n));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tape_matches_tree_evaluation() {
        let x = Expr::sym("x");
        let y = Expr::sym("y");
        let e = (3.0 * x.clone() * y.clone() - y.clone().powi(2)) / (x.clone().powi(2) + y.clone().powi(2));
        let layout = [Symbol("y"), Symbol("x")];
        let tape = Tape::compile(&e, &layout).unwrap();
        assert_eq!(tape.arity(), 2);

        let env = [(Symbol("x"), 0.9), (Symbol("y"), -0.2)].into_iter().collect();
        let expected = e.eval(&env).unwrap();
        assert!((tape.eval(&[-0.2, 0.9]) - expected).abs() < 1e-14);
    }

    #[test]
    fn unknown_symbol_is_a_modeling_error() {
        let e = Expr::sym("q");
        let err = Tape::compile(&e, &[Symbol("x")]).unwrap_err();
        assert!(matches!(err, NrpfError::Modeling(_)));
    }

    #[test]
    fn reused_stack_gives_same_answer() {
        let e = Expr::sym("a") * Expr::sym("b") + 1.0;
        let tape = Tape::compile(&e, &[Symbol("a"), Symbol("b")]).unwrap();
        let mut stack = Vec::new();
        assert_eq!(tape.eval_with(&[2.0, 3.0], &mut stack), 7.0);
        assert_eq!(tape.eval_with(&[1.0, 1.0], &mut stack), 2.0);
    }
}
