//! # Symbolic derivative engine
//!
//! Builds the Newton stamps of device Lagrangians from their symbolic form.
//!
//! - [`expr`]: expression trees, differentiation, simplification, expansion
//! - [`split`]: constant / linear / nonlinear classification of terms
//! - [`compile`]: stack-tape evaluators over a fixed input layout
//! - [`lagrange`]: [`LagrangeHandler`] and [`DerivativeEntry`]
//!
//! Handlers are built once per device kind and evaluated every iteration.

pub mod compile;
pub mod expr;
pub mod lagrange;
pub mod split;

pub use compile::Tape;
pub use expr::{Expr, Symbol};
pub use lagrange::{Component, DerivativeEntry, LagrangeHandler};
pub use split::{is_constant, is_linear, linear_term, split_expr, Split};
