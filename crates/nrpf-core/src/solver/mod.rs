//! Linear-system backends used by the Newton-Raphson iteration.

pub mod backend;
pub mod registry;

pub use backend::{DenseLuSolver, LinearSystemBackend, SparseLuSolver};
pub use registry::SolverKind;
