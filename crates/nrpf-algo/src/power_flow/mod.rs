//! Power Flow Solvers
//!
//! - [`nr_solver`]: the Newton-Raphson iteration over the stamped system
//! - [`runner`]: tx-stepping homotopy and between-solve device control
//! - [`results`]: bus voltages, device power, residual diagnostics

pub mod nr_solver;
pub mod results;
pub mod runner;

pub use nr_solver::{NrOutcome, NrSolver};
pub use results::{BusResult, InfeasibilityResult, InjectionResult, PowerFlowResults};
pub use runner::PowerFlow;
